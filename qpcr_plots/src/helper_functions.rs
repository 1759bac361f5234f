use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, error, info};

use crate::models::polars_err;

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

pub fn read_csv(file_path: &Path) -> PolarsResult<DataFrame> {
    if !file_path.is_file() {
        error!("Input file not found: {}", file_path.display());
        return Err(polars_err(
            format!("input file not found: {}", file_path.display()).into(),
        ));
    }

    info!("Reading data from {}", file_path.display());
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))?
        .finish()?;
    debug!("Loaded {} rows x {} cols", df.height(), df.width());

    Ok(df)
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Apply `(old, new)` renames for the columns that are present; others are ignored.
pub fn rename_if_present(df: &mut DataFrame, renames: &[(&str, &str)]) -> PolarsResult<()> {
    for &(old, new) in renames {
        if has_column(df, old) && !has_column(df, new) {
            debug!("Renaming column '{}' -> '{}'", old, new);
            df.rename(old, new.into())?;
        }
    }
    Ok(())
}

pub fn require_columns(df: &DataFrame, required: &[&str], table: &str) -> PolarsResult<()> {
    for &name in required {
        if !has_column(df, name) {
            error!("{}: required column '{}' is missing", table, name);
            return Err(PolarsError::ColumnNotFound(
                format!("{table}: required column '{name}' is missing").into(),
            ));
        }
    }
    Ok(())
}

/// Values of a text-like column; numeric columns are rendered as text.
pub fn string_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()))
        .collect())
}

/// Values of a numeric column; cells that do not parse as numbers come back as `None`.
pub fn f64_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Pull a required cell, naming the table, column and row when it is empty.
pub fn required<T>(value: Option<T>, table: &str, column: &str, row: usize) -> PolarsResult<T> {
    value.ok_or_else(|| {
        error!("{}: missing or non-numeric '{}' at row {}", table, column, row + 1);
        polars_err(format!("{table}: missing or invalid value in column '{column}' at row {}", row + 1).into())
    })
}

pub fn ensure_parent_dir(path: &Path) -> PolarsResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| polars_err(Box::new(e)))?;
        }
    }
    Ok(())
}
