use std::cmp::Ordering;

use image::GrayImage;
use logging_timer::time;
use serde::{Deserialize, Serialize};

use crate::geometry::cell_rect;
use crate::image_utils::fill_ratio;
use crate::sheet::{Region, RegionKind};
use crate::types::{Detection, Symbol};

/// Decision rules for four-way answer rows.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnswerThresholds {
    /// Fraction of the cell trimmed from each side before counting.
    pub padding: f32,
    pub dark_threshold: u8,
    /// Rows whose darkest and lightest options differ by less are blank.
    pub min_spread: f32,
    /// Rows whose darkest option is lighter than this are blank.
    pub min_fill: f32,
    /// The darkest option must beat the runner-up by at least this much.
    pub min_margin: f32,
}

impl Default for AnswerThresholds {
    fn default() -> Self {
        Self {
            padding: 0.30,
            dark_threshold: 200,
            min_spread: 0.10,
            min_fill: 0.55,
            min_margin: 0.05,
        }
    }
}

/// Decision rules for single-column identifier fields.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentifierThresholds {
    pub padding: f32,
    pub dark_threshold: u8,
    /// Rows at least this full are candidates.
    pub min_fill: f32,
    /// The fullest candidate must beat the runner-up by more than this.
    pub min_margin: f32,
}

impl Default for IdentifierThresholds {
    fn default() -> Self {
        Self {
            padding: 0.10,
            dark_threshold: 220,
            min_fill: 0.40,
            min_margin: 0.05,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkThresholds {
    pub answer: AnswerThresholds,
    pub identifier: IdentifierThresholds,
}

/// Fill ratios are quotients of pixel counts, so a ratio that sits exactly on
/// a threshold can land a rounding step to either side of it.
const BOUNDARY_EPSILON: f32 = 1e-6;

fn below(value: f32, threshold: f32) -> bool {
    value < threshold - BOUNDARY_EPSILON
}

fn above(value: f32, threshold: f32) -> bool {
    value > threshold + BOUNDARY_EPSILON
}

fn descending(a: &f32, b: &f32) -> Ordering {
    b.partial_cmp(a).unwrap_or(Ordering::Equal)
}

/// Option indices ordered from fullest to emptiest; equal scores keep their
/// left-to-right order.
fn ranked(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| descending(&scores[a], &scores[b]));
    order
}

fn resolved(labels: &[String], index: usize) -> Symbol {
    Symbol::Resolved {
        label: labels.get(index).cloned().unwrap_or_default(),
        index,
    }
}

/// Picks the marked option of one answer row from its per-option fill ratios.
pub fn classify_answer_row(scores: &[f32], labels: &[String], thresholds: &AnswerThresholds) -> Symbol {
    let order = ranked(scores);
    let (first, last) = match (order.first(), order.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Symbol::Blank,
    };
    let max = scores[first];
    let min = scores[last];
    let second = order.get(1).map_or(0.0, |&i| scores[i]);

    if below(max - min, thresholds.min_spread) || below(max, thresholds.min_fill) {
        Symbol::Blank
    } else if below(max - second, thresholds.min_margin) {
        Symbol::Multiple
    } else {
        resolved(labels, first)
    }
}

/// Picks the marked row of an identifier column from its per-row fill ratios.
pub fn classify_identifier_column(
    scores: &[f32],
    labels: &[String],
    thresholds: &IdentifierThresholds,
) -> Symbol {
    let candidates: Vec<usize> = ranked(scores)
        .into_iter()
        .filter(|&row| !below(scores[row], thresholds.min_fill))
        .collect();

    match candidates.as_slice() {
        [] => Symbol::Blank,
        [only] => resolved(labels, *only),
        [top, runner_up, ..] => {
            if above(scores[*top] - scores[*runner_up], thresholds.min_margin) {
                resolved(labels, *top)
            } else {
                Symbol::Multiple
            }
        }
    }
}

fn strongest(scores: &[f32]) -> f32 {
    scores.iter().copied().fold(0.0, f32::max)
}

/// Reads every answer row of `region`. Gap rows are skipped and do not use up
/// question numbers.
pub fn scan_answer_region(
    img: &GrayImage,
    region: &Region,
    start_question: u32,
    thresholds: &AnswerThresholds,
) -> Vec<Detection> {
    let mut question = start_question;
    let mut detections = vec![];

    for (row_index, row) in region.row_layout().iter().enumerate() {
        if row.is_gap {
            continue;
        }
        let scores: Vec<f32> = (0..region.columns)
            .map(|column| {
                let cell = cell_rect(&region.bounds, region.columns, row, column);
                fill_ratio(img, &cell, thresholds.padding, thresholds.dark_threshold)
            })
            .collect();

        detections.push(Detection {
            question: Some(question),
            row: Some(row_index),
            symbol: classify_answer_row(&scores, &region.labels, thresholds),
            confidence: strongest(&scores),
        });
        question += 1;
    }

    detections
}

/// Reads an identifier column into a single detection.
pub fn scan_identifier_region(
    img: &GrayImage,
    region: &Region,
    thresholds: &IdentifierThresholds,
) -> Detection {
    let scores: Vec<f32> = region
        .row_layout()
        .iter()
        .map(|row| {
            let cell = cell_rect(&region.bounds, 1, row, 0);
            fill_ratio(img, &cell, thresholds.padding, thresholds.dark_threshold)
        })
        .collect();

    let symbol = classify_identifier_column(&scores, &region.labels, thresholds);
    Detection {
        question: None,
        row: symbol.index(),
        symbol,
        confidence: strongest(&scores),
    }
}

#[time]
pub fn scan_region(img: &GrayImage, region: &Region, thresholds: &MarkThresholds) -> Vec<Detection> {
    match region.kind {
        RegionKind::Answer { start_question } => {
            scan_answer_region(img, region, start_question, &thresholds.answer)
        }
        RegionKind::Identifier { .. } => {
            vec![scan_identifier_region(img, region, &thresholds.identifier)]
        }
    }
}
