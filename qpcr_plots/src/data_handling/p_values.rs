use std::path::PathBuf;

use polars::prelude::*;
use tracing::{debug, error, info};

use crate::helper_functions::{f64_values, read_csv, rename_if_present, require_columns, required, string_values};
use crate::models::{polars_err, ComparisonRecord, Dataset};

pub const GROUP1_COL: &str = "Group1";
pub const GROUP2_COL: &str = "Group2";
pub const NEG_LOG10_P_COL: &str = "-log10(P-Value)";

/// Header written by the qPCR statistics export.
const RAW_NEG_LOG10_P_COL: &str = "[-log10(p-value)]";

const TABLE: &str = "p-value table";

/// Pairwise comparison table behind the significance heatmap.
pub struct PValueTable {
    pub path: PathBuf,
}

impl Dataset for PValueTable {
    type Record = ComparisonRecord;

    fn load(&self) -> PolarsResult<DataFrame> {
        let mut df = match read_csv(&self.path) {
            Ok(df) => df,
            Err(e) => {
                error!("Failed to read p-value CSV: {}", e);
                return Err(e);
            }
        };

        rename_if_present(&mut df, &[(RAW_NEG_LOG10_P_COL, NEG_LOG10_P_COL)])?;
        require_columns(&df, &[GROUP1_COL, GROUP2_COL, NEG_LOG10_P_COL], TABLE)?;
        info!("Loaded {} pairwise comparisons", df.height());

        Ok(df)
    }

    fn records(df: &DataFrame) -> PolarsResult<Vec<ComparisonRecord>> {
        require_columns(df, &[GROUP1_COL, GROUP2_COL, NEG_LOG10_P_COL], TABLE)?;

        let group1 = string_values(df, GROUP1_COL)?;
        let group2 = string_values(df, GROUP2_COL)?;
        let values = f64_values(df, NEG_LOG10_P_COL)?;

        let mut records = Vec::with_capacity(df.height());
        for (row, ((g1, g2), value)) in group1.into_iter().zip(group2).zip(values).enumerate() {
            let group1 = required(g1, TABLE, GROUP1_COL, row)?;
            let group2 = required(g2, TABLE, GROUP2_COL, row)?;

            if let Some(v) = value {
                if v < 0.0 {
                    error!("{}: negative -log10(p) {} at row {}", TABLE, v, row + 1);
                    return Err(polars_err(
                        format!("{TABLE}: -log10(p) must be >= 0, got {v} at row {}", row + 1).into(),
                    ));
                }
            } else {
                debug!("No -log10(p) for {} vs {}; cell left empty", group1, group2);
            }

            records.push(ComparisonRecord {
                group1,
                group2,
                neg_log10_p: value,
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;
    use std::fs;

    #[test]
    fn raw_export_header_is_renamed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("QPCR-results-p-values.csv");
        fs::write(
            &path,
            "Group1,Group2,[-log10(p-value)]\nB_0hpi,Y_0hpi,1.30\nB_0hpi,D_0hpi,0.25\n",
        )
        .unwrap();

        let records = PValueTable { path }.load_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].group1, "B_0hpi");
        assert_eq!(records[0].group2, "Y_0hpi");
        assert_eq!(records[0].neg_log10_p, Some(1.30));
    }

    #[test]
    fn missing_value_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.csv");
        fs::write(&path, "Group1,Group2,pvalue\nB,Y,0.05\n").unwrap();

        let err = PValueTable { path }.load().unwrap_err();
        assert!(matches!(err, PolarsError::ColumnNotFound(_)));
    }

    #[test]
    fn empty_cells_become_missing_values() {
        let df = df![
            "Group1" => &["B", "B"],
            "Group2" => &["Y", "D"],
            "-log10(P-Value)" => &[Some(2.0), None]
        ]
        .unwrap();
        let records = PValueTable::records(&df).unwrap();
        assert_eq!(records[1].neg_log10_p, None);
    }

    #[test]
    fn negative_significance_is_malformed() {
        let df = df![
            "Group1" => &["B"],
            "Group2" => &["Y"],
            "-log10(P-Value)" => &[-0.5]
        ]
        .unwrap();
        assert!(PValueTable::records(&df).is_err());
    }
}
