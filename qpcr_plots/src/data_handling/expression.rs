use std::path::PathBuf;

use polars::prelude::*;
use tracing::{debug, error, info, warn};

use crate::helper_functions::{f64_values, read_csv, require_columns, required, string_values};
use crate::models::{polars_err, time_index, Dataset, ExpressionRecord, Treatment};

pub const TIME_COL: &str = "Time";
pub const TREATMENT_COL: &str = "Treatment";
pub const EXPRESSION_COL: &str = "Expression";
pub const LOWER_COL: &str = "Exp. Lower Error Bar";
pub const UPPER_COL: &str = "Exp. Upper Error Bar";

const REQUIRED: [&str; 5] = [TIME_COL, TREATMENT_COL, EXPRESSION_COL, LOWER_COL, UPPER_COL];
const TABLE: &str = "expression table";

/// Relative expression per (time point, treatment), one row per bar.
pub struct ExpressionTable {
    pub path: PathBuf,
}

impl Dataset for ExpressionTable {
    type Record = ExpressionRecord;

    fn load(&self) -> PolarsResult<DataFrame> {
        let df = match read_csv(&self.path) {
            Ok(df) => df,
            Err(e) => {
                error!("Failed to read expression CSV: {}", e);
                return Err(e);
            }
        };
        require_columns(&df, &REQUIRED, TABLE)?;

        // Error bars sometimes come out of the spreadsheet as text.
        let df = df
            .lazy()
            .with_columns([
                col(EXPRESSION_COL).cast(DataType::Float64),
                col(LOWER_COL).cast(DataType::Float64),
                col(UPPER_COL).cast(DataType::Float64),
            ])
            .collect()?;
        info!("Loaded {} expression rows", df.height());

        Ok(df)
    }

    fn records(df: &DataFrame) -> PolarsResult<Vec<ExpressionRecord>> {
        require_columns(df, &REQUIRED, TABLE)?;

        let times = string_values(df, TIME_COL)?;
        let treatments = string_values(df, TREATMENT_COL)?;
        let expression = f64_values(df, EXPRESSION_COL)?;
        let lower = f64_values(df, LOWER_COL)?;
        let upper = f64_values(df, UPPER_COL)?;

        let mut records = Vec::with_capacity(df.height());
        let mut skipped = 0usize;

        for row in 0..df.height() {
            let time = required(times[row].clone(), TABLE, TIME_COL, row)?;
            let code = required(treatments[row].clone(), TABLE, TREATMENT_COL, row)?;
            let time_index = time_index(&time)?;

            let Some(treatment) = Treatment::parse(&code) else {
                debug!("Skipping row {} with unplotted treatment '{}'", row + 1, code);
                skipped += 1;
                continue;
            };

            let expression = required(expression[row], TABLE, EXPRESSION_COL, row)?;
            let lower = required(lower[row], TABLE, LOWER_COL, row)?;
            let upper = required(upper[row], TABLE, UPPER_COL, row)?;

            if lower > expression || upper < expression {
                error!(
                    "{}: error bar [{}, {}] does not contain {} at row {}",
                    TABLE, lower, upper, expression, row + 1
                );
                return Err(polars_err(
                    format!(
                        "{TABLE}: error bar [{lower}, {upper}] does not contain expression {expression} at row {}",
                        row + 1
                    )
                    .into(),
                ));
            }

            records.push(ExpressionRecord {
                time,
                time_index,
                treatment,
                expression,
                lower,
                upper,
            });
        }

        if skipped > 0 {
            warn!("Skipped {} expression rows with treatments outside {:?}", skipped, Treatment::ALL);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;
    use std::fs;

    fn frame(times: &[&str], treatments: &[&str], values: &[(f64, f64, f64)]) -> DataFrame {
        df![
            TIME_COL => times,
            TREATMENT_COL => treatments,
            EXPRESSION_COL => values.iter().map(|v| v.0).collect::<Vec<_>>(),
            LOWER_COL => values.iter().map(|v| v.1).collect::<Vec<_>>(),
            UPPER_COL => values.iter().map(|v| v.2).collect::<Vec<_>>()
        ]
        .unwrap()
    }

    #[test]
    fn rows_become_typed_records() {
        let df = frame(&["0hpi", "12hpi"], &["B", "Y"], &[(2.0, 1.8, 2.2), (1.0, 0.8, 1.2)]);
        let records = ExpressionTable::records(&df).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].treatment, Treatment::B);
        assert_eq!(records[1].time_index, 1);
        assert_eq!(records[1].upper, 1.2);
    }

    #[test]
    fn unknown_treatment_rows_are_skipped() {
        let df = frame(&["0hpi", "0hpi"], &["B", "Q"], &[(2.0, 1.8, 2.2), (1.0, 0.8, 1.2)]);
        let records = ExpressionTable::records(&df).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn unknown_time_point_fails() {
        let df = frame(&["96hpi"], &["B"], &[(2.0, 1.8, 2.2)]);
        assert!(ExpressionTable::records(&df).is_err());
    }

    #[test]
    fn inverted_error_bar_is_malformed() {
        let df = frame(&["0hpi"], &["B"], &[(2.0, 2.1, 2.2)]);
        let err = ExpressionTable::records(&df).unwrap_err();
        assert!(err.to_string().contains("error bar"));
    }

    #[test]
    fn load_validates_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expression_data.csv");
        fs::write(&path, "Time,Treatment,Expression\n0hpi,B,2.0\n").unwrap();
        let err = ExpressionTable { path }.load().unwrap_err();
        assert!(matches!(err, PolarsError::ColumnNotFound(_)));
    }

    #[test]
    fn load_reads_spreadsheet_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expression_data.csv");
        fs::write(
            &path,
            "Time,Treatment,Expression,Exp. Lower Error Bar,Exp. Upper Error Bar\n\
             0hpi,B,2.0,1.8,2.2\n\
             0hpi,Y,1,0.8,1.2\n",
        )
        .unwrap();
        let records = ExpressionTable { path }.load_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].expression, 1.0);
    }
}
