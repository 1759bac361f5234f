use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontStyle, FontTransform};
use plotters_backend::text_anchor::{HPos, Pos, VPos};
use plotters_svg::SVGBackend;
use polars::prelude::*;
use tracing::{error, info};

use crate::analysis::significance_matrix::SignificanceMatrix;
use crate::helper_functions::ensure_parent_dir;
use crate::models::polars_err;

pub const HEATMAP_SIZE: (u32, u32) = (1000, 600);

const MARGIN_LEFT: i32 = 170;
const MARGIN_TOP: i32 = 20;
const MARGIN_RIGHT: i32 = 160;
const MARGIN_BOTTOM: i32 = 170;
const COLOUR_BAR_WIDTH: i32 = 20;
const COLOUR_BAR_STEPS: i32 = 120;
const COLOUR_BAR_TICKS: usize = 5;

/// Diverging blue-grey-red scale; `t` is clamped to `[0, 1]`.
pub fn coolwarm(t: f64) -> RGBColor {
    const COOL: [f64; 3] = [59.0, 76.0, 192.0];
    const MID: [f64; 3] = [221.0, 221.0, 221.0];
    const WARM: [f64; 3] = [180.0, 4.0, 38.0];

    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
    let (from, to, u) = if t < 0.5 {
        (COOL, MID, t * 2.0)
    } else {
        (MID, WARM, (t - 0.5) * 2.0)
    };
    let channel = |i: usize| (from[i] + (to[i] - from[i]) * u).round() as u8;
    RGBColor(channel(0), channel(1), channel(2))
}

/// Black on light cells, white on dark ones.
fn annotation_colour(fill: RGBColor) -> RGBColor {
    let RGBColor(r, g, b) = fill;
    let luminance = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
    if luminance > 140.0 {
        BLACK
    } else {
        WHITE
    }
}

fn normalise(value: f64, (lo, hi): (f64, f64)) -> f64 {
    if hi - lo <= f64::EPSILON {
        0.5
    } else {
        (value - lo) / (hi - lo)
    }
}

/// Pixel geometry of the cell grid. Row 0 is drawn at the top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatmapLayout {
    pub left: i32,
    pub top: i32,
    pub cell_width: f64,
    pub cell_height: f64,
    pub rows: usize,
    pub columns: usize,
}

impl HeatmapLayout {
    pub fn new(size: (u32, u32), rows: usize, columns: usize) -> Self {
        let grid_width = (size.0 as i32 - MARGIN_LEFT - MARGIN_RIGHT).max(1) as f64;
        let grid_height = (size.1 as i32 - MARGIN_TOP - MARGIN_BOTTOM).max(1) as f64;
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            cell_width: grid_width / columns.max(1) as f64,
            cell_height: grid_height / rows.max(1) as f64,
            rows,
            columns,
        }
    }

    fn x(&self, column: usize) -> i32 {
        self.left + (column as f64 * self.cell_width).round() as i32
    }

    fn y(&self, row: usize) -> i32 {
        self.top + (row as f64 * self.cell_height).round() as i32
    }

    /// Upper-left and lower-right corners; neighbouring cells share edges.
    pub fn cell_rect(&self, row: usize, column: usize) -> [(i32, i32); 2] {
        [(self.x(column), self.y(row)), (self.x(column + 1), self.y(row + 1))]
    }

    pub fn cell_centre(&self, row: usize, column: usize) -> (i32, i32) {
        let [(x0, y0), (x1, y1)] = self.cell_rect(row, column);
        ((x0 + x1) / 2, (y0 + y1) / 2)
    }

    pub fn right(&self) -> i32 {
        self.x(self.columns)
    }

    pub fn bottom(&self) -> i32 {
        self.y(self.rows)
    }
}

/// Render the matrix as an annotated heatmap and save it as SVG.
pub fn plot_significance_heatmap(matrix: &SignificanceMatrix, output_path: &Path) -> PolarsResult<()> {
    if matrix.is_empty() {
        error!("No comparisons to plot");
        return Err(polars_err("p-value table has no comparisons to plot".into()));
    }

    ensure_parent_dir(output_path)?;
    let root = SVGBackend::new(output_path, HEATMAP_SIZE).into_drawing_area();
    draw_heatmap(&root, matrix)?;
    root.present().map_err(|e| polars_err(Box::new(e)))?;

    info!("Heatmap saved successfully as: {}", output_path.display());
    Ok(())
}

fn draw_heatmap<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, matrix: &SignificanceMatrix) -> PolarsResult<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(|e| polars_err(Box::new(e)))?;

    let layout = HeatmapLayout::new(root.dim_in_pixel(), matrix.rows().len(), matrix.columns().len());
    let range = matrix.value_range().unwrap_or((0.0, 1.0));

    for (row, column, value) in matrix.cells() {
        let Some(value) = value else { continue };
        let rect = layout.cell_rect(row, column);
        let fill = coolwarm(normalise(value, range));
        let ink = annotation_colour(fill);

        root.draw(&Rectangle::new(rect, fill.filled()))
            .map_err(|e| polars_err(Box::new(e)))?;
        root.draw(&Rectangle::new(rect, WHITE.stroke_width(1)))
            .map_err(|e| polars_err(Box::new(e)))?;

        let style = ("sans-serif", 10.0)
            .into_font()
            .color(&ink)
            .pos(Pos::new(HPos::Center, VPos::Center));
        root.draw(&Text::new(format!("{:.2}", value), layout.cell_centre(row, column), style))
            .map_err(|e| polars_err(Box::new(e)))?;
    }

    let tick_font = ("sans-serif", 12.0).into_font();

    for (row, label) in matrix.rows().iter().enumerate() {
        let (_, y) = layout.cell_centre(row, 0);
        let style = tick_font.color(&BLACK).pos(Pos::new(HPos::Right, VPos::Center));
        root.draw(&Text::new(label.clone(), (layout.left - 6, y), style))
            .map_err(|e| polars_err(Box::new(e)))?;
    }

    for (column, label) in matrix.columns().iter().enumerate() {
        let (x, _) = layout.cell_centre(0, column);
        let style = tick_font
            .transform(FontTransform::Rotate270)
            .color(&BLACK)
            .pos(Pos::new(HPos::Right, VPos::Center));
        root.draw(&Text::new(label.clone(), (x, layout.bottom() + 6), style))
            .map_err(|e| polars_err(Box::new(e)))?;
    }

    let desc_font = ("sans-serif", 14.0, FontStyle::Bold).into_font();
    let (width, height) = root.dim_in_pixel();
    root.draw(&Text::new(
        "Treatment Groups",
        ((layout.left + layout.right()) / 2, height as i32 - 12),
        desc_font.color(&BLACK).pos(Pos::new(HPos::Center, VPos::Bottom)),
    ))
    .map_err(|e| polars_err(Box::new(e)))?;
    root.draw(&Text::new(
        "Treatment Groups",
        (12, (layout.top + layout.bottom()) / 2),
        desc_font
            .transform(FontTransform::Rotate270)
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Top)),
    ))
    .map_err(|e| polars_err(Box::new(e)))?;

    draw_colour_bar(root, &layout, range, width)?;

    Ok(())
}

fn draw_colour_bar<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    layout: &HeatmapLayout,
    (lo, hi): (f64, f64),
    width: u32,
) -> PolarsResult<()>
where
    DB::ErrorType: 'static,
{
    let x0 = layout.right() + 30;
    let x1 = x0 + COLOUR_BAR_WIDTH;
    let (top, bottom) = (layout.top, layout.bottom());
    let span = (bottom - top) as f64;

    for step in 0..COLOUR_BAR_STEPS {
        let y0 = top + (span * step as f64 / COLOUR_BAR_STEPS as f64).round() as i32;
        let y1 = top + (span * (step + 1) as f64 / COLOUR_BAR_STEPS as f64).round() as i32;
        // Highest values at the top.
        let t = 1.0 - (step as f64 + 0.5) / COLOUR_BAR_STEPS as f64;
        root.draw(&Rectangle::new([(x0, y0), (x1, y1)], coolwarm(t).filled()))
            .map_err(|e| polars_err(Box::new(e)))?;
    }
    root.draw(&Rectangle::new([(x0, top), (x1, bottom)], BLACK.stroke_width(1)))
        .map_err(|e| polars_err(Box::new(e)))?;

    let tick_style = ("sans-serif", 11.0)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Left, VPos::Center));
    for i in 0..COLOUR_BAR_TICKS {
        let frac = i as f64 / (COLOUR_BAR_TICKS - 1) as f64;
        let y = bottom - (span * frac).round() as i32;
        let value = lo + (hi - lo) * frac;
        root.draw(&PathElement::new(vec![(x1, y), (x1 + 4, y)], BLACK.stroke_width(1)))
            .map_err(|e| polars_err(Box::new(e)))?;
        root.draw(&Text::new(format!("{:.1}", value), (x1 + 7, y), tick_style.clone()))
            .map_err(|e| polars_err(Box::new(e)))?;
    }

    root.draw(&Text::new(
        "-log10(P-Value)",
        ((width as i32 - 16).max(x1 + 50), (top + bottom) / 2),
        ("sans-serif", 14.0)
            .into_font()
            .transform(FontTransform::Rotate90)
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Top)),
    ))
    .map_err(|e| polars_err(Box::new(e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ComparisonRecord;
    use std::fs;

    #[test]
    fn coolwarm_runs_blue_to_red() {
        let low = coolwarm(0.0);
        let mid = coolwarm(0.5);
        let high = coolwarm(1.0);
        assert!(low.2 > low.0);
        assert!(high.0 > high.2);
        assert_eq!(mid, RGBColor(221, 221, 221));
        assert_eq!(coolwarm(-3.0), low);
        assert_eq!(coolwarm(f64::NAN), mid);
    }

    #[test]
    fn annotation_text_contrasts_with_cell() {
        assert_eq!(annotation_colour(coolwarm(0.5)), BLACK);
        assert_eq!(annotation_colour(coolwarm(1.0)), WHITE);
    }

    #[test]
    fn flat_range_maps_to_midpoint() {
        assert_eq!(normalise(3.0, (3.0, 3.0)), 0.5);
        assert_eq!(normalise(2.0, (0.0, 4.0)), 0.5);
    }

    #[test]
    fn cells_tile_the_grid_without_gaps() {
        let layout = HeatmapLayout::new(HEATMAP_SIZE, 3, 7);
        for row in 0..3 {
            for column in 0..6 {
                let [_, (right, _)] = layout.cell_rect(row, column);
                let [(left, _), _] = layout.cell_rect(row, column + 1);
                assert_eq!(right, left);
            }
        }
        assert_eq!(layout.cell_rect(0, 0)[0], (MARGIN_LEFT, MARGIN_TOP));
        assert_eq!(layout.right(), HEATMAP_SIZE.0 as i32 - MARGIN_RIGHT);
        assert_eq!(layout.bottom(), HEATMAP_SIZE.1 as i32 - MARGIN_BOTTOM);
    }

    #[test]
    fn first_row_is_drawn_on_top() {
        let layout = HeatmapLayout::new(HEATMAP_SIZE, 2, 2);
        assert!(layout.cell_centre(0, 0).1 < layout.cell_centre(1, 0).1);
    }

    #[test]
    fn empty_matrix_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let matrix = SignificanceMatrix::pivot(&[]).unwrap();
        assert!(plot_significance_heatmap(&matrix, &dir.path().join("h.svg")).is_err());
    }

    #[test]
    fn writes_svg_with_one_annotation_per_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heatmap_p_values.svg");
        let matrix = SignificanceMatrix::pivot(&[
            ComparisonRecord { group1: "B".into(), group2: "Y".into(), neg_log10_p: Some(1.234) },
            ComparisonRecord { group1: "Y".into(), group2: "B".into(), neg_log10_p: Some(0.5) },
        ])
        .unwrap();

        plot_significance_heatmap(&matrix, &path).unwrap();

        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.contains("1.23"));
        assert!(svg.contains("0.50"));
        assert!(svg.contains("Treatment Groups"));
    }
}
