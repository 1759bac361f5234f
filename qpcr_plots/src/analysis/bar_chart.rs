use std::collections::BTreeMap;
use std::path::Path;

use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::FontStyle;
use plotters_backend::text_anchor::{HPos, Pos, VPos};
use plotters_bitmap::BitMapBackend;
use plotters_svg::SVGBackend;
use polars::prelude::*;
use tracing::{debug, error, info};

use crate::analysis::bracket_layout::{draw_brackets, layout_brackets, Bracket, BracketCanvas, ChartGeometry};
use crate::helper_functions::ensure_parent_dir;
use crate::models::{polars_err, ExpressionRecord, SignificanceAnnotation, Treatment, TIME_ORDER};

/// Pixel size of an export and the factor applied to fonts, strokes and margins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FigureSize {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

pub const SVG_FIGURE: FigureSize = FigureSize { width: 1200, height: 600, scale: 1.0 };
/// Print-resolution raster of the same figure.
pub const RASTER_FIGURE: FigureSize = FigureSize { width: 3600, height: 1800, scale: 3.0 };

fn colour_for_treatment(treatment: Treatment) -> RGBColor {
    match treatment {
        Treatment::B => RGBColor(0xd7, 0x30, 0x27),
        Treatment::Y => RGBColor(0x45, 0x75, 0xb4),
        Treatment::D => RGBColor(0x74, 0xad, 0xd1),
        Treatment::N => RGBColor(0xfd, 0xae, 0x61),
    }
}

/// One bar per (time point, treatment).
#[derive(Debug, Default, Clone)]
pub struct BarChartData {
    bars: BTreeMap<(usize, Treatment), ExpressionRecord>,
}

impl BarChartData {
    /// Group expression rows into bars. Two rows for the same bar are rejected.
    pub fn from_records(records: Vec<ExpressionRecord>) -> PolarsResult<Self> {
        let mut bars = BTreeMap::new();
        for record in records {
            let key = (record.time_index, record.treatment);
            if bars.contains_key(&key) {
                error!("Duplicate expression row for {} at {}", record.treatment.code(), record.time);
                return Err(polars_err(
                    format!(
                        "duplicate expression row for treatment {} at {}",
                        record.treatment.code(),
                        record.time
                    )
                    .into(),
                ));
            }
            bars.insert(key, record);
        }
        Ok(Self { bars })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn bar(&self, time_index: usize, treatment: Treatment) -> Option<&ExpressionRecord> {
        self.bars.get(&(time_index, treatment))
    }

    pub fn upper_bound(&self, time_index: usize, treatment: Treatment) -> Option<f64> {
        self.bar(time_index, treatment).map(|b| b.upper)
    }

    /// Bars of one treatment in time order.
    pub fn bars_for(&self, treatment: Treatment) -> impl Iterator<Item = &ExpressionRecord> + '_ {
        self.bars.values().filter(move |b| b.treatment == treatment)
    }

    pub fn max_upper(&self) -> Option<f64> {
        self.bars.values().map(|b| b.upper).reduce(f64::max)
    }

    pub fn min_lower(&self) -> Option<f64> {
        self.bars.values().map(|b| b.lower).reduce(f64::min)
    }
}

/// Vertical extent of the value axis: from zero (or the lowest error bar, if
/// negative) to a little above the highest bracket label.
pub fn value_axis_range(data: &BarChartData, brackets: &[Bracket]) -> (f64, f64) {
    let bottom = data.min_lower().map_or(0.0, |v| v.min(0.0));
    let highest = brackets
        .iter()
        .map(|b| b.top)
        .fold(data.max_upper().unwrap_or(0.0), f64::max);
    let top = if highest > bottom { highest * 1.12 } else { bottom + 1.0 };
    (bottom, top)
}

/// Place brackets and export the chart as SVG and PNG, then write the bracket ledger.
pub fn plot_expression_chart(
    data: &BarChartData,
    annotations: &[SignificanceAnnotation],
    svg_path: &Path,
    raster_path: &Path,
    ledger_path: &Path,
) -> PolarsResult<Vec<Bracket>> {
    let geometry = ChartGeometry::default();
    let brackets = layout_brackets(data, annotations, &geometry)?;
    info!("Placed {} significance brackets for {} annotations", brackets.len(), annotations.len());

    render_svg(data, &brackets, &geometry, svg_path)?;
    info!("Expression plot saved to {}", svg_path.display());

    render_raster(data, &brackets, &geometry, raster_path)?;
    info!("Expression plot saved to {}", raster_path.display());

    write_bracket_ledger(ledger_path, &brackets)?;

    Ok(brackets)
}

pub fn render_svg(
    data: &BarChartData,
    brackets: &[Bracket],
    geometry: &ChartGeometry,
    path: &Path,
) -> PolarsResult<()> {
    ensure_parent_dir(path)?;
    let root = SVGBackend::new(path, (SVG_FIGURE.width, SVG_FIGURE.height)).into_drawing_area();
    draw_expression_chart(&root, data, brackets, geometry, SVG_FIGURE.scale)?;
    root.present().map_err(|e| polars_err(Box::new(e)))?;
    Ok(())
}

pub fn render_raster(
    data: &BarChartData,
    brackets: &[Bracket],
    geometry: &ChartGeometry,
    path: &Path,
) -> PolarsResult<()> {
    ensure_parent_dir(path)?;
    let root = BitMapBackend::new(path, (RASTER_FIGURE.width, RASTER_FIGURE.height)).into_drawing_area();
    draw_expression_chart(&root, data, brackets, geometry, RASTER_FIGURE.scale)?;
    root.present().map_err(|e| polars_err(Box::new(e)))?;
    Ok(())
}

fn draw_expression_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    data: &BarChartData,
    brackets: &[Bracket],
    geometry: &ChartGeometry,
    scale: f64,
) -> PolarsResult<()>
where
    DB::ErrorType: 'static,
{
    let px = |v: f64| (v * scale).round() as u32;
    let stroke = px(1.5).max(1);

    root.fill(&WHITE).map_err(|e| polars_err(Box::new(e)))?;

    // Shift x so each group's centre sits on an integer tick.
    let shift = geometry.group_centre_offset();
    let groups = TIME_ORDER.len();
    let (y_min, y_max) = value_axis_range(data, brackets);

    let mut chart = ChartBuilder::on(root)
        .margin(px(20.0))
        .x_label_area_size(px(80.0))
        .y_label_area_size(px(90.0))
        .build_cartesian_2d(-0.5..(groups as f64 - 0.5), y_min..y_max)
        .map_err(|e| polars_err(Box::new(e)))?;

    let time_label = |x: &f64| {
        let i = x.round();
        if (x - i).abs() < 1e-6 && i >= 0.0 && (i as usize) < groups {
            TIME_ORDER[i as usize].to_string()
        } else {
            String::new()
        }
    };

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(groups)
        .x_label_formatter(&time_label)
        .x_label_style(("sans-serif", 14.0 * scale).into_font().color(&BLACK))
        .y_label_style(("sans-serif", 12.0 * scale).into_font().color(&BLACK))
        .x_desc("Time Points (hpi; hours post-infiltration)")
        .y_desc("Expression Level")
        .axis_desc_style(("sans-serif", 18.0 * scale, FontStyle::Bold).into_font().color(&BLACK))
        .axis_style(BLACK.stroke_width(px(1.0).max(1)))
        .draw()
        .map_err(|e| polars_err(Box::new(e)))?;

    let half = geometry.bar_width / 2.0;
    let cap = px(5.0);
    let swatch = (7.0 * scale) as i32;

    for treatment in Treatment::ALL {
        let colour = colour_for_treatment(treatment);
        let bars: Vec<&ExpressionRecord> = data.bars_for(treatment).collect();
        debug!("Drawing {} bars for {}", bars.len(), treatment.label());

        chart
            .draw_series(bars.iter().map(|b| {
                let x = geometry.x_position(b.time_index, treatment) - shift;
                Rectangle::new([(x - half, 0.0), (x + half, b.expression)], colour.filled())
            }))
            .map_err(|e| polars_err(Box::new(e)))?
            .label(treatment.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - swatch), (x + 2 * swatch, y + swatch)], colour.filled()));

        chart
            .draw_series(bars.iter().map(|b| {
                let x = geometry.x_position(b.time_index, treatment) - shift;
                ErrorBar::new_vertical(x, b.lower, b.expression, b.upper, BLACK.stroke_width(stroke), cap)
            }))
            .map_err(|e| polars_err(Box::new(e)))?;
    }

    {
        let mut canvas = PlottersCanvas { chart: &mut chart, x_shift: shift, scale };
        draw_brackets(&mut canvas, brackets)?;
    }

    let plot_dim = chart.plotting_area().dim_in_pixel();
    let (legend_x, legend_y) = legend_origin(plot_dim, scale);

    chart
        .configure_series_labels()
        .background_style(WHITE)
        .border_style(BLACK)
        .label_font(("sans-serif", 14.0 * scale).into_font().color(&BLACK))
        .legend_area_size(px(30.0))
        .position(SeriesLabelPosition::Coordinate(legend_x, legend_y))
        .draw()
        .map_err(|e| polars_err(Box::new(e)))?;

    let (base_x, base_y) = chart.plotting_area().get_base_pixel();
    root.draw(&Text::new(
        "Treatments",
        (base_x + legend_x, base_y + legend_y - px(4.0) as i32),
        ("sans-serif", 14.0 * scale, FontStyle::Bold)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Left, VPos::Bottom)),
    ))
    .map_err(|e| polars_err(Box::new(e)))?;

    Ok(())
}

/// Upper-left corner of the legend box inside the plotting area, leaving a
/// strip above it for the legend title.
fn legend_origin(plot_dim: (u32, u32), scale: f64) -> (i32, i32) {
    let box_width = (170.0 * scale) as i32;
    let inset = (10.0 * scale) as i32;
    let title_height = (24.0 * scale) as i32;
    ((plot_dim.0 as i32 - box_width - inset).max(inset), inset + title_height)
}

/// Draws brackets straight into a chart's data coordinates.
struct PlottersCanvas<'c, 'a, DB: DrawingBackend> {
    chart: &'c mut ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    x_shift: f64,
    scale: f64,
}

impl<DB: DrawingBackend> BracketCanvas for PlottersCanvas<'_, '_, DB>
where
    DB::ErrorType: 'static,
{
    fn polyline(&mut self, points: &[(f64, f64)]) -> PolarsResult<()> {
        let shifted: Vec<(f64, f64)> = points.iter().map(|&(x, y)| (x - self.x_shift, y)).collect();
        let width = (self.scale.round() as u32).max(1);
        self.chart
            .draw_series(std::iter::once(PathElement::new(shifted, BLACK.stroke_width(width))))
            .map_err(|e| polars_err(Box::new(e)))?;
        Ok(())
    }

    fn centered_text(&mut self, text: &str, at: (f64, f64)) -> PolarsResult<()> {
        let style = ("sans-serif", 12.0 * self.scale, FontStyle::Bold)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Bottom));
        self.chart
            .draw_series(std::iter::once(Text::new(text.to_string(), (at.0 - self.x_shift, at.1), style)))
            .map_err(|e| polars_err(Box::new(e)))?;
        Ok(())
    }
}

/// One CSV row per drawn bracket, in drawing order.
pub fn write_bracket_ledger(path: &Path, brackets: &[Bracket]) -> PolarsResult<()> {
    ensure_parent_dir(path)?;
    let mut wtr = csv::Writer::from_path(path).map_err(|e| polars_err(Box::new(e)))?;
    for bracket in brackets {
        wtr.serialize(bracket).map_err(|e| polars_err(Box::new(e)))?;
    }
    wtr.flush().map_err(|e| polars_err(Box::new(e)))?;
    info!("Bracket ledger written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::time_index;
    use std::fs;

    fn bar(time: &str, treatment: Treatment, expression: f64, lower: f64, upper: f64) -> ExpressionRecord {
        ExpressionRecord {
            time: time.to_string(),
            time_index: time_index(time).unwrap(),
            treatment,
            expression,
            lower,
            upper,
        }
    }

    fn note(time: &str, t1: &str, t2: &str, stars: &str) -> SignificanceAnnotation {
        SignificanceAnnotation {
            time: time.to_string(),
            treatment1: t1.to_string(),
            treatment2: t2.to_string(),
            stars: stars.to_string(),
        }
    }

    fn sample() -> BarChartData {
        BarChartData::from_records(vec![
            bar("0hpi", Treatment::B, 2.0, 1.8, 2.2),
            bar("0hpi", Treatment::Y, 1.0, 0.8, 1.2),
            bar("24hpi", Treatment::N, 0.4, 0.3, 0.5),
        ])
        .unwrap()
    }

    #[test]
    fn bars_are_keyed_by_time_and_treatment() {
        let data = sample();
        assert_eq!(data.len(), 3);
        assert_eq!(data.upper_bound(0, Treatment::B), Some(2.2));
        assert_eq!(data.upper_bound(0, Treatment::D), None);
        assert_eq!(data.bars_for(Treatment::N).count(), 1);
        assert_eq!(data.max_upper(), Some(2.2));
    }

    #[test]
    fn duplicate_bar_is_rejected() {
        let err = BarChartData::from_records(vec![
            bar("0hpi", Treatment::B, 2.0, 1.8, 2.2),
            bar("0hpi", Treatment::B, 2.1, 1.9, 2.3),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn value_axis_leaves_room_above_brackets() {
        let data = sample();
        let brackets = layout_brackets(&data, &[note("0hpi", "B", "Y", "*")], &ChartGeometry::default()).unwrap();
        let (bottom, top) = value_axis_range(&data, &brackets);
        assert_eq!(bottom, 0.0);
        assert!(top > brackets[0].top);
    }

    #[test]
    fn value_axis_of_empty_chart_is_not_degenerate() {
        let (bottom, top) = value_axis_range(&BarChartData::default(), &[]);
        assert!(top > bottom);
    }

    #[test]
    fn colours_follow_the_treatment_palette() {
        assert_eq!(colour_for_treatment(Treatment::B), RGBColor(215, 48, 39));
        assert_eq!(colour_for_treatment(Treatment::N), RGBColor(253, 174, 97));
    }

    #[test]
    fn ledger_lists_every_bracket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brackets.csv");
        let data = sample();
        let notes = [note("0hpi", "B", "Y", "*"), note("0hpi", "Y", "B", "**")];
        let brackets = layout_brackets(&data, &notes, &ChartGeometry::default()).unwrap();

        write_bracket_ledger(&path, &brackets).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Time,Treatment1,Treatment2,Stars,x1,x2,clearance,level,base,top"
        );
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("0hpi,B,Y,*,"));
        assert!(rows[1].starts_with("0hpi,Y,B,**,"));
    }

    #[test]
    fn legend_leaves_room_for_its_title() {
        for figure in [SVG_FIGURE, RASTER_FIGURE] {
            let plot = ((figure.width as f64 * 0.85) as u32, (figure.height as f64 * 0.8) as u32);
            let (x, y) = legend_origin(plot, figure.scale);
            assert!(x > 0 && (x as u32) < plot.0);
            assert!(y as f64 >= 24.0 * figure.scale);
            assert!((y as u32) < plot.1);
        }
    }

    #[test]
    #[ignore = "needs a system sans-serif font for axis label layout"]
    fn renders_svg_and_png() {
        let dir = tempfile::tempdir().unwrap();
        let svg = dir.path().join("expression_plot.svg");
        let png = dir.path().join("expression_plot.png");
        let ledger = dir.path().join("expression_plot_brackets.csv");

        let brackets =
            plot_expression_chart(&sample(), &[note("0hpi", "B", "Y", "*")], &svg, &png, &ledger).unwrap();

        assert_eq!(brackets.len(), 1);
        let text = fs::read_to_string(&svg).unwrap();
        assert!(text.contains("<svg"));
        assert!(text.contains("Treatments"));
        assert!(fs::metadata(&png).unwrap().len() > 0);
    }
}
