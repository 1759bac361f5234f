use polars::prelude::*;
use serde::Serialize;
use tracing::error;

/// Fold any non-polars error (io, plotters, csv) into the crate-wide error type.
pub fn polars_err(e: Box<dyn std::error::Error>) -> PolarsError {
    PolarsError::ComputeError(e.to_string().into())
}

/// Sampling points of the time course, in plotting order.
pub const TIME_ORDER: [&str; 5] = ["0hpi", "12hpi", "24hpi", "48hpi", "72hpi"];

/// Resolve a time label to its group index on the x axis.
///
/// Unknown labels are a hard error: every table in the experiment is keyed on
/// the same five sampling points.
pub fn time_index(time: &str) -> PolarsResult<usize> {
    TIME_ORDER
        .iter()
        .position(|t| *t == time.trim())
        .ok_or_else(|| {
            error!("Unknown time point '{}'", time);
            polars_err(
                format!(
                    "unknown time point '{}' (expected one of {})",
                    time,
                    TIME_ORDER.join(", ")
                )
                .into(),
            )
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Treatment {
    /// Ptr ToxB infiltration
    B,
    /// YPD medium
    Y,
    /// Water mock
    D,
    /// Non-infiltrated control
    N,
}

impl Treatment {
    /// Slot order inside a time-point group.
    pub const ALL: [Treatment; 4] = [Treatment::B, Treatment::Y, Treatment::D, Treatment::N];

    pub fn parse(code: &str) -> Option<Self> {
        match code.trim() {
            "B" => Some(Treatment::B),
            "Y" => Some(Treatment::Y),
            "D" => Some(Treatment::D),
            "N" => Some(Treatment::N),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Treatment::B => "B",
            Treatment::Y => "Y",
            Treatment::D => "D",
            Treatment::N => "N",
        }
    }

    pub fn slot(self) -> usize {
        match self {
            Treatment::B => 0,
            Treatment::Y => 1,
            Treatment::D => 2,
            Treatment::N => 3,
        }
    }

    /// Legend text.
    pub fn label(self) -> &'static str {
        match self {
            Treatment::B => "Ptr ToxB",
            Treatment::Y => "YPD",
            Treatment::D => "Water",
            Treatment::N => "NIC",
        }
    }
}

/// One row of the pairwise comparison table feeding the heatmap.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRecord {
    pub group1: String,
    pub group2: String,
    /// `None` when the table has no value for the pair.
    pub neg_log10_p: Option<f64>,
}

/// Mean expression of one treatment at one time point, with its error interval.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionRecord {
    pub time: String,
    pub time_index: usize,
    pub treatment: Treatment,
    pub expression: f64,
    pub lower: f64,
    pub upper: f64,
}

/// "Treatment1 differs from Treatment2 at Time1", with the star label to print.
///
/// Treatments stay raw strings here; unknown codes are dropped at layout time.
#[derive(Debug, Clone, PartialEq)]
pub struct SignificanceAnnotation {
    pub time: String,
    pub treatment1: String,
    pub treatment2: String,
    pub stars: String,
}

/// A tabular input file: `load` reads and normalises the frame, `records`
/// turns it into typed rows.
pub trait Dataset {
    type Record;

    fn load(&self) -> PolarsResult<DataFrame>;

    fn records(df: &DataFrame) -> PolarsResult<Vec<Self::Record>>;

    fn load_records(&self) -> PolarsResult<Vec<Self::Record>> {
        let df = self.load()?;
        Self::records(&df)
    }
}
