use std::collections::{BTreeSet, HashMap};

use polars::prelude::*;
use tracing::{debug, error};

use crate::models::{polars_err, ComparisonRecord};

/// Dense Group1 x Group2 view of the pairwise comparison table.
///
/// Row and column labels are sorted, matching a relational pivot. A pair that
/// never appears in the table (or whose value is empty) reads as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignificanceMatrix {
    rows: Vec<String>,
    columns: Vec<String>,
    cells: Vec<Option<f64>>,
}

impl SignificanceMatrix {
    /// Pivot long-format records. Each ordered (Group1, Group2) pair may appear
    /// at most once; a repeated pair is rejected instead of silently overwritten.
    pub fn pivot(records: &[ComparisonRecord]) -> PolarsResult<Self> {
        let rows: Vec<String> = records
            .iter()
            .map(|r| r.group1.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let columns: Vec<String> = records
            .iter()
            .map(|r| r.group2.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let row_index: HashMap<&str, usize> =
            rows.iter().enumerate().map(|(i, g)| (g.as_str(), i)).collect();
        let column_index: HashMap<&str, usize> =
            columns.iter().enumerate().map(|(i, g)| (g.as_str(), i)).collect();

        let mut cells = vec![None; rows.len() * columns.len()];
        let mut seen = vec![false; cells.len()];

        for record in records {
            let idx = row_index[record.group1.as_str()] * columns.len()
                + column_index[record.group2.as_str()];
            if seen[idx] {
                error!("Duplicate comparison {} vs {}", record.group1, record.group2);
                return Err(polars_err(
                    format!(
                        "duplicate comparison for Group1 '{}' and Group2 '{}'",
                        record.group1, record.group2
                    )
                    .into(),
                ));
            }
            seen[idx] = true;
            cells[idx] = record.neg_log10_p;
        }

        debug!("Pivoted {} comparisons into a {}x{} matrix", records.len(), rows.len(), columns.len());

        Ok(Self { rows, columns, cells })
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// `(row, column, value)` for every cell, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, Option<f64>)> + '_ {
        let width = self.columns.len();
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, v)| (i / width, i % width, *v))
    }

    /// Smallest and largest present value; `None` when every cell is missing.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.cells.iter().flatten().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}
