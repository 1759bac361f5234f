//! Placement of significance brackets above grouped bars.
//!
//! Every annotation gets a bracket spanning its two bars. The bracket starts
//! above the taller of the two error bars; annotations that hit exactly the
//! same pair of bars at the same time point are stacked upwards in input order.
//! Overlapping but non-identical spans are not packed against each other.

use std::collections::HashMap;

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, error};

use crate::analysis::bar_chart::BarChartData;
use crate::models::{polars_err, time_index, SignificanceAnnotation, Treatment};

/// Bar and bracket geometry, in data units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartGeometry {
    pub bar_width: f64,
    /// Bracket clearance as a multiple of the tallest error bar.
    pub clearance_factor: f64,
    /// Vertical step between stacked brackets on the same pair of bars.
    pub stack_spacing: f64,
    /// Distance from the clearance height to the bracket feet.
    pub bracket_gap: f64,
    pub tick_height: f64,
}

impl Default for ChartGeometry {
    fn default() -> Self {
        Self {
            bar_width: 0.2,
            clearance_factor: 1.1,
            stack_spacing: 0.08,
            bracket_gap: 0.08,
            tick_height: 0.05,
        }
    }
}

impl ChartGeometry {
    pub fn x_position(&self, time_index: usize, treatment: Treatment) -> f64 {
        time_index as f64 + treatment.slot() as f64 * self.bar_width
    }

    /// Offset from a group's base x to the middle of its bar cluster.
    pub fn group_centre_offset(&self) -> f64 {
        (Treatment::ALL.len() - 1) as f64 * self.bar_width / 2.0
    }
}

/// Two brackets share a key when they join the same two bars of the same group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlacementKey {
    pub time_index: usize,
    pub left_slot: usize,
    pub right_slot: usize,
}

impl PlacementKey {
    pub fn new(time_index: usize, a: Treatment, b: Treatment) -> Self {
        Self {
            time_index,
            left_slot: a.slot().min(b.slot()),
            right_slot: a.slot().max(b.slot()),
        }
    }
}

/// How many brackets have already been placed on each key. Lives for one layout pass.
#[derive(Debug, Default)]
pub struct BracketStacker {
    levels: HashMap<PlacementKey, usize>,
}

impl BracketStacker {
    /// Level for the next bracket on `key`, starting at 0.
    pub fn next_level(&mut self, key: PlacementKey) -> usize {
        let level = self.levels.entry(key).or_insert(0);
        let current = *level;
        *level += 1;
        current
    }
}

/// A placed bracket: feet at `base`, crossbar at `top`, label above the crossbar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bracket {
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Treatment1")]
    pub treatment1: Treatment,
    #[serde(rename = "Treatment2")]
    pub treatment2: Treatment,
    #[serde(rename = "Stars")]
    pub stars: String,
    pub x1: f64,
    pub x2: f64,
    /// `clearance_factor` times the taller error bar of the pair.
    pub clearance: f64,
    pub level: usize,
    pub base: f64,
    pub top: f64,
}

impl Bracket {
    /// Up, across, down.
    pub fn polyline(&self) -> [(f64, f64); 4] {
        [
            (self.x1, self.base),
            (self.x1, self.top),
            (self.x2, self.top),
            (self.x2, self.base),
        ]
    }

    pub fn label_anchor(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, self.top)
    }
}

/// Place one bracket per annotation, in input order.
///
/// An annotation whose time point is not on the axis aborts the layout; one
/// naming a treatment outside the plotted set is dropped.
pub fn layout_brackets(
    bars: &BarChartData,
    annotations: &[SignificanceAnnotation],
    geometry: &ChartGeometry,
) -> PolarsResult<Vec<Bracket>> {
    let mut stacker = BracketStacker::default();
    let mut brackets = Vec::with_capacity(annotations.len());

    for annotation in annotations {
        let group = time_index(&annotation.time)?;

        let (t1, t2) = match (
            Treatment::parse(&annotation.treatment1),
            Treatment::parse(&annotation.treatment2),
        ) {
            (Some(t1), Some(t2)) => (t1, t2),
            _ => {
                debug!(
                    "Skipping annotation {} vs {} at {}: treatment not plotted",
                    annotation.treatment1, annotation.treatment2, annotation.time
                );
                continue;
            }
        };

        let tallest = [t1, t2]
            .iter()
            .filter_map(|&t| bars.upper_bound(group, t))
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        let Some(tallest) = tallest else {
            error!(
                "No bars for {} or {} at {}",
                annotation.treatment1, annotation.treatment2, annotation.time
            );
            return Err(polars_err(
                format!(
                    "no expression rows for treatment {} or {} at {}",
                    annotation.treatment1, annotation.treatment2, annotation.time
                )
                .into(),
            ));
        };

        let clearance = tallest * geometry.clearance_factor;
        let level = stacker.next_level(PlacementKey::new(group, t1, t2));
        let base = clearance + level as f64 * geometry.stack_spacing + geometry.bracket_gap;

        brackets.push(Bracket {
            time: annotation.time.clone(),
            treatment1: t1,
            treatment2: t2,
            stars: annotation.stars.clone(),
            x1: geometry.x_position(group, t1),
            x2: geometry.x_position(group, t2),
            clearance,
            level,
            base,
            top: base + geometry.tick_height,
        });
    }

    debug!("Placed {} of {} brackets", brackets.len(), annotations.len());
    Ok(brackets)
}

/// The two drawing primitives a bracket needs.
pub trait BracketCanvas {
    fn polyline(&mut self, points: &[(f64, f64)]) -> PolarsResult<()>;

    /// Text horizontally centred on `at.0`, sitting on `at.1`.
    fn centered_text(&mut self, text: &str, at: (f64, f64)) -> PolarsResult<()>;
}

pub fn draw_brackets<C: BracketCanvas + ?Sized>(canvas: &mut C, brackets: &[Bracket]) -> PolarsResult<()> {
    for bracket in brackets {
        canvas.polyline(&bracket.polyline())?;
        canvas.centered_text(&bracket.stars, bracket.label_anchor())?;
    }
    Ok(())
}
