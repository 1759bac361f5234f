use std::path::Path;

use anyhow::Context;
use polars::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::analysis::bar_chart::{plot_expression_chart, BarChartData};
use crate::analysis::heatmap::plot_significance_heatmap;
use crate::analysis::significance_matrix::SignificanceMatrix;
use crate::data_handling::expression::ExpressionTable;
use crate::data_handling::p_values::PValueTable;
use crate::data_handling::significance::SignificanceTable;
use crate::helper_functions::project_root;
use crate::models::Dataset;

mod analysis;
mod data_handling;
mod helper_functions;
mod models;

const P_VALUE_TABLE: &str = "QPCR-results-p-values.csv";
const HEATMAP_SVG: &str = "heatmap_p_values.svg";

const EXPRESSION_TABLE: &str = "expression_data.csv";
const SIGNIFICANCE_TABLE: &str = "p_values.csv";
const EXPRESSION_SVG: &str = "expression_plot.svg";
const EXPRESSION_PNG: &str = "expression_plot.png";
const BRACKET_LEDGER: &str = "expression_plot_brackets.csv";

fn run_heatmap_pipeline(root: &Path) -> PolarsResult<()> {
    let table = PValueTable {
        path: root.join(P_VALUE_TABLE),
    };
    let comparisons = table.load_records()?;

    let matrix = SignificanceMatrix::pivot(&comparisons)?;
    plot_significance_heatmap(&matrix, &root.join(HEATMAP_SVG))
}

fn run_expression_pipeline(root: &Path) -> PolarsResult<()> {
    let expression = ExpressionTable {
        path: root.join(EXPRESSION_TABLE),
    }
    .load_records()?;
    let data = BarChartData::from_records(expression)?;
    info!("Loaded {} expression bars", data.len());

    let annotations = SignificanceTable {
        path: root.join(SIGNIFICANCE_TABLE),
    }
    .load_records()?;

    plot_expression_chart(
        &data,
        &annotations,
        &root.join(EXPRESSION_SVG),
        &root.join(EXPRESSION_PNG),
        &root.join(BRACKET_LEDGER),
    )?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let root = project_root();
    info!("Starting qPCR figure pipelines in {}", root.display());

    run_heatmap_pipeline(&root).context("heatmap pipeline failed")?;
    run_expression_pipeline(&root).context("expression plot pipeline failed")?;

    info!("All figures written");
    Ok(())
}
