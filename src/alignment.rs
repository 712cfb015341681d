use image::GrayImage;
use log::{debug, warn};
use logging_timer::time;
use serde::{Deserialize, Serialize};

use crate::geometry::Offset;

/// Where to look for a printed reference rule, as fractions of the page.
///
/// `position_*` bounds the candidate line positions (rows for a horizontal
/// rule, columns for a vertical one); `extent_*` bounds the stretch of each
/// candidate line that is counted. The extent may run past the page edge;
/// pixels beyond it count as dark.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBand {
    pub position_start: f32,
    pub position_end: f32,
    pub extent_start: f32,
    pub extent_end: f32,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlignmentConfig {
    /// Expected row of the horizontal rule, as a fraction of page height.
    pub expected_rule_y_ratio: f32,
    /// Expected column of the vertical rule, as a fraction of page width.
    pub expected_rule_x_ratio: f32,
    pub dark_threshold: u8,
    /// A line qualifies when more than this fraction of its pixels are dark.
    pub min_dark_fraction: f32,
    pub horizontal_rule_band: SearchBand,
    pub vertical_rule_band: SearchBand,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            expected_rule_y_ratio: 0.227,
            expected_rule_x_ratio: 0.355,
            dark_threshold: 200,
            min_dark_fraction: 0.5,
            horizontal_rule_band: SearchBand {
                position_start: 0.3,
                position_end: 0.5,
                extent_start: 0.2,
                extent_end: 1.0,
            },
            vertical_rule_band: SearchBand {
                position_start: 0.2,
                position_end: 0.5,
                extent_start: 0.5,
                extent_end: 1.4,
            },
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Vertical,
}

/// Converts a pair of ratios to a pixel range clipped to `0..len`.
fn band_range(start_ratio: f32, end_ratio: f32, len: u32) -> std::ops::Range<u32> {
    let start = ((len as f32 * start_ratio).floor().max(0.0) as u32).min(len);
    let end = ((len as f32 * end_ratio).floor().max(0.0) as u32).min(len);
    start..end.max(start)
}

/// Converts a pair of ratios to a pixel range that may leave `0..len`.
fn unclipped_range(start_ratio: f32, end_ratio: f32, len: u32) -> std::ops::Range<i64> {
    let start = (len as f32 * start_ratio).floor() as i64;
    let end = (len as f32 * end_ratio).floor() as i64;
    start..end.max(start)
}

/// Finds the darkest qualifying line in the band and returns its absolute
/// pixel position. The first line wins ties.
fn find_rule(
    img: &GrayImage,
    band: &SearchBand,
    orientation: Orientation,
    dark_threshold: u8,
    min_dark_fraction: f32,
) -> Option<u32> {
    let (width, height) = img.dimensions();
    let (position_len, extent_len) = match orientation {
        Orientation::Horizontal => (height, width),
        Orientation::Vertical => (width, height),
    };
    let positions = band_range(band.position_start, band.position_end, position_len);
    let extent = unclipped_range(band.extent_start, band.extent_end, extent_len);
    let min_dark = (extent.end - extent.start) as f32 * min_dark_fraction;

    let mut best: Option<(u32, u32)> = None;
    for position in positions {
        let dark = extent
            .clone()
            .filter(|&along| {
                if along < 0 || along >= extent_len as i64 {
                    return true;
                }
                let (x, y) = match orientation {
                    Orientation::Horizontal => (along as u32, position),
                    Orientation::Vertical => (position, along as u32),
                };
                img.get_pixel(x, y).0[0] < dark_threshold
            })
            .count() as u32;

        if dark as f32 > min_dark && best.map_or(true, |(_, most)| dark > most) {
            best = Some((position, dark));
        }
    }

    best.map(|(position, _)| position)
}

/// Row of the horizontal reference rule, if one is visible.
pub fn find_horizontal_rule(img: &GrayImage, config: &AlignmentConfig) -> Option<u32> {
    find_rule(
        img,
        &config.horizontal_rule_band,
        Orientation::Horizontal,
        config.dark_threshold,
        config.min_dark_fraction,
    )
}

/// Column of the vertical reference rule, if one is visible.
pub fn find_vertical_rule(img: &GrayImage, config: &AlignmentConfig) -> Option<u32> {
    find_rule(
        img,
        &config.vertical_rule_band,
        Orientation::Vertical,
        config.dark_threshold,
        config.min_dark_fraction,
    )
}

/// Measures how far the scan is shifted from the template. An axis whose
/// rule cannot be found is left uncorrected.
#[time]
pub fn detect_offset(img: &GrayImage, config: &AlignmentConfig) -> Offset {
    let (width, height) = img.dimensions();

    let y = match find_horizontal_rule(img, config) {
        Some(row) => row as f32 - height as f32 * config.expected_rule_y_ratio,
        None => {
            warn!("no horizontal reference rule found; keeping template rows");
            0.0
        }
    };
    let x = match find_vertical_rule(img, config) {
        Some(column) => column as f32 - width as f32 * config.expected_rule_x_ratio,
        None => {
            warn!("no vertical reference rule found; keeping template columns");
            0.0
        }
    };

    debug!("detected offset x={:.1} y={:.1}", x, y);
    Offset::new(x, y)
}
