use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

/// Rows at this interval are gap rows when a region has gaps enabled.
pub const GAP_ROW_INTERVAL: usize = 6;

/// Signed pixel shift between where the template expects the sheet to be and
/// where the scan actually put it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

impl Offset {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A region's rectangle in page pixels. Fractional, since it comes from
/// proportions of the page size.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RegionBounds {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// A whole-pixel rectangle. Unlike [`Rect`] it may be empty, which happens for
/// cells on very small rasters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn to_rect(&self) -> Option<Rect> {
        if self.width == 0 || self.height == 0 {
            None
        } else {
            Some(Rect::at(self.left, self.top).of_size(self.width, self.height))
        }
    }
}

/// Vertical placement of one row inside a region, relative to the region top.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowLayout {
    pub top: f32,
    pub height: f32,
    pub is_gap: bool,
}

pub fn is_gap_row(row: usize, has_gaps: bool) -> bool {
    has_gaps && (row + 1) % GAP_ROW_INTERVAL == 0
}

/// Splits `height` into `rows` stacked rows. Every row weighs 1 except gap rows
/// (every 6th row, when enabled), which weigh `gap_ratio`.
pub fn row_layout(height: f32, rows: u32, gap_ratio: f32, has_gaps: bool) -> Vec<RowLayout> {
    let rows = rows as usize;
    let weight = |row: usize| {
        if is_gap_row(row, has_gaps) {
            gap_ratio
        } else {
            1.0
        }
    };

    let total_units: f32 = (0..rows).map(weight).sum();
    if total_units <= 0.0 {
        return vec![];
    }
    let px_per_unit = height / total_units;

    let mut top = 0.0;
    (0..rows)
        .map(|row| {
            let row_height = weight(row) * px_per_unit;
            let layout = RowLayout {
                top,
                height: row_height,
                is_gap: is_gap_row(row, has_gaps),
            };
            top += row_height;
            layout
        })
        .collect()
}

/// The pixel rectangle of the cell at `column` within `row` of a region,
/// floored to whole pixels.
pub fn cell_rect(bounds: &RegionBounds, columns: u32, row: &RowLayout, column: u32) -> PixelRect {
    let cell_width = bounds.width / columns.max(1) as f32;
    PixelRect {
        left: (bounds.x + column as f32 * cell_width).floor() as i32,
        top: (bounds.y + row.top).floor() as i32,
        width: cell_width.floor().max(0.0) as u32,
        height: row.height.floor().max(0.0) as u32,
    }
}

/// Positions sampled along one axis of a padded cell: unit steps from
/// `start + pad` while below `start + len - pad`.
pub fn padded_samples(start: i32, len: u32, padding: f32) -> impl Iterator<Item = f32> {
    let pad = len as f32 * padding;
    let first = start as f32 + pad;
    let end = start as f32 + len as f32 - pad;
    (0u32..)
        .map(move |step| first + step as f32)
        .take_while(move |position| *position < end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn gap_rows_fall_on_every_sixth_row() {
        let rows = row_layout(100.0, 12, 0.5, true);
        let gaps: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_gap)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(gaps, vec![5, 11]);
    }

    #[test]
    fn gap_rows_are_scaled_by_the_gap_ratio() {
        // 5 full rows + 1 gap at 0.5 => 5.5 units
        let rows = row_layout(110.0, 6, 0.5, true);
        assert!((rows[0].height - 20.0).abs() < 1e-4);
        assert!((rows[5].height - 10.0).abs() < 1e-4);
        assert!((rows[5].top - 100.0).abs() < 1e-4);
    }

    #[test]
    fn rows_without_gaps_are_uniform() {
        let rows = row_layout(70.0, 7, 0.4, false);
        assert!(rows.iter().all(|r| !r.is_gap));
        assert!(rows.iter().all(|r| (r.height - 10.0).abs() < 1e-4));
    }

    #[test]
    fn no_rows_gives_empty_layout() {
        assert!(row_layout(50.0, 0, 0.6, true).is_empty());
    }

    #[test]
    fn cell_rect_floors_to_pixels() {
        let bounds = RegionBounds {
            x: 10.7,
            y: 20.2,
            width: 41.0,
            height: 30.0,
        };
        let row = RowLayout {
            top: 5.5,
            height: 9.9,
            is_gap: false,
        };
        let cell = cell_rect(&bounds, 4, &row, 2);
        assert_eq!(
            cell,
            PixelRect {
                left: 31,
                top: 25,
                width: 10,
                height: 9
            }
        );
    }

    #[test]
    fn empty_pixel_rect_has_no_imageproc_rect() {
        let cell = PixelRect {
            left: 0,
            top: 0,
            width: 0,
            height: 4,
        };
        assert!(cell.to_rect().is_none());
    }

    #[test]
    fn padded_samples_skip_the_border() {
        let samples: Vec<f32> = padded_samples(10, 10, 0.3).collect();
        assert_eq!(samples, vec![13.0, 14.0, 15.0, 16.0]);
        assert_eq!(padded_samples(0, 0, 0.3).count(), 0);
    }

    proptest! {
        #[test]
        fn gap_count_and_height_sum_hold(rows in 1u32..120, height in 1.0f32..5000.0, gap_ratio in 0.05f32..2.0) {
            let layout = row_layout(height, rows, gap_ratio, true);
            prop_assert_eq!(layout.len(), rows as usize);
            prop_assert_eq!(layout.iter().filter(|r| r.is_gap).count(), rows as usize / 6);
            let total: f32 = layout.iter().map(|r| r.height).sum();
            prop_assert!((total - height).abs() <= height * 1e-4);
        }

        #[test]
        fn rows_are_stacked_without_spacing(rows in 1u32..60, height in 1.0f32..3000.0) {
            let layout = row_layout(height, rows, 0.6, true);
            for pair in layout.windows(2) {
                prop_assert!((pair[0].top + pair[0].height - pair[1].top).abs() <= height * 1e-4);
            }
        }
    }
}
