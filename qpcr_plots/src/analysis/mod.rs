pub mod bar_chart;
pub mod bracket_layout;
pub mod heatmap;
pub mod significance_matrix;
