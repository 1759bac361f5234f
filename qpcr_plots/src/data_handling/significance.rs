use std::path::PathBuf;

use polars::prelude::*;
use tracing::{error, info};

use crate::helper_functions::{read_csv, require_columns, required, string_values};
use crate::models::{Dataset, SignificanceAnnotation};

pub const TIME1_COL: &str = "Time1";
pub const TREATMENT1_COL: &str = "Treatment1";
pub const TREATMENT2_COL: &str = "Treatment2";
pub const STARS_COL: &str = "Stars";

const REQUIRED: [&str; 4] = [TIME1_COL, TREATMENT1_COL, TREATMENT2_COL, STARS_COL];
const TABLE: &str = "significance table";

/// Post-hoc comparisons to annotate on the bar chart, in drawing order.
pub struct SignificanceTable {
    pub path: PathBuf,
}

impl Dataset for SignificanceTable {
    type Record = SignificanceAnnotation;

    fn load(&self) -> PolarsResult<DataFrame> {
        let df = match read_csv(&self.path) {
            Ok(df) => df,
            Err(e) => {
                error!("Failed to read significance CSV: {}", e);
                return Err(e);
            }
        };
        require_columns(&df, &REQUIRED, TABLE)?;
        info!("Loaded {} significance annotations", df.height());

        Ok(df)
    }

    fn records(df: &DataFrame) -> PolarsResult<Vec<SignificanceAnnotation>> {
        require_columns(df, &REQUIRED, TABLE)?;

        let times = string_values(df, TIME1_COL)?;
        let first = string_values(df, TREATMENT1_COL)?;
        let second = string_values(df, TREATMENT2_COL)?;
        let stars = string_values(df, STARS_COL)?;

        (0..df.height())
            .map(|row| {
                Ok(SignificanceAnnotation {
                    time: required(times[row].clone(), TABLE, TIME1_COL, row)?,
                    treatment1: required(first[row].clone(), TABLE, TREATMENT1_COL, row)?,
                    treatment2: required(second[row].clone(), TABLE, TREATMENT2_COL, row)?,
                    stars: required(stars[row].clone(), TABLE, STARS_COL, row)?,
                })
            })
            .collect()
    }
}
