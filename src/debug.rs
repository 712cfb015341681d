use std::path::{Path, PathBuf};

use image::{ImageResult, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut},
    rect::Rect,
};
use log::debug;

use crate::{
    alignment::{find_horizontal_rule, find_vertical_rule, AlignmentConfig},
    geometry::{cell_rect, PixelRect, RowLayout},
    grading::AnswerKey,
    image_utils::{gray_to_rgb, BLUE, GRAY, GREEN, ORANGE, PINK, RED},
    interpret::{Page, RegionResult},
    sheet::{Region, RegionKind},
    types::Symbol,
};

/// Path of the overlay written for the page image at `base`.
pub fn debug_image_path(base: &Path) -> PathBuf {
    let mut result = PathBuf::from(base);
    result.set_file_name(format!(
        "{}_debug_regions.png",
        base.file_stem().unwrap_or_default().to_string_lossy()
    ));
    result
}

fn inset(cell: &PixelRect, by: u32) -> Option<Rect> {
    PixelRect {
        left: cell.left + by as i32,
        top: cell.top + by as i32,
        width: cell.width.saturating_sub(by * 2),
        height: cell.height.saturating_sub(by * 2),
    }
    .to_rect()
}

fn row_rect(region: &Region, row: &RowLayout) -> Option<Rect> {
    PixelRect {
        left: region.bounds.x.floor() as i32,
        top: (region.bounds.y + row.top).floor() as i32,
        width: region.bounds.width.floor().max(0.0) as u32,
        height: row.height.floor().max(0.0) as u32,
    }
    .to_rect()
}

/// Outlines every region, shades its gap rows and rules its cells.
pub fn draw_regions_debug_image_mut(canvas: &mut RgbImage, regions: &[Region]) {
    for region in regions {
        let bounds = region.bounds;
        let outline = if region.is_answer() { RED } else { BLUE };
        let rows = region.row_layout();

        for row in rows.iter().filter(|row| row.is_gap) {
            if let Some(rect) = row_rect(region, row) {
                draw_filled_rect_mut(canvas, rect, GRAY);
            }
        }

        for row in rows.iter().skip(1) {
            let y = bounds.y + row.top;
            draw_line_segment_mut(canvas, (bounds.x, y), (bounds.x + bounds.width, y), outline);
        }

        let cell_width = bounds.width / region.columns.max(1) as f32;
        for column in 1..region.columns {
            let x = bounds.x + column as f32 * cell_width;
            draw_line_segment_mut(canvas, (x, bounds.y), (x, bounds.y + bounds.height), outline);
        }

        if let Some(rect) = (PixelRect {
            left: bounds.x.floor() as i32,
            top: bounds.y.floor() as i32,
            width: bounds.width.ceil().max(0.0) as u32,
            height: bounds.height.ceil().max(0.0) as u32,
        })
        .to_rect()
        {
            draw_hollow_rect_mut(canvas, rect, outline);
        }
    }
}

/// Highlights what was read: answers green when right (or when there is no
/// key), red when wrong, orange for ambiguous rows; identifiers in blue.
pub fn draw_detections_debug_image_mut(
    canvas: &mut RgbImage,
    regions: &[Region],
    results: &[RegionResult],
    answer_key: Option<&AnswerKey>,
) {
    for result in results {
        let Some(region) = regions.iter().find(|region| region.id == result.id) else {
            continue;
        };
        let rows = region.row_layout();

        for detection in &result.detections {
            let Some(row) = detection.row.and_then(|row| rows.get(row)) else {
                continue;
            };

            match (&region.kind, &detection.symbol) {
                (RegionKind::Identifier { .. }, Symbol::Resolved { .. }) => {
                    let cell = cell_rect(&region.bounds, 1, row, 0);
                    if let Some(rect) = inset(&cell, 2) {
                        draw_filled_rect_mut(canvas, rect, BLUE);
                    }
                }
                (RegionKind::Answer { .. }, Symbol::Resolved { index, .. }) => {
                    let color: Rgb<u8> = match answer_key {
                        Some(key) if !key.is_empty() && !key.is_correct(detection) => RED,
                        _ => GREEN,
                    };
                    let cell = cell_rect(&region.bounds, region.columns, row, *index as u32);
                    if let Some(rect) = inset(&cell, 2) {
                        draw_filled_rect_mut(canvas, rect, color);
                    }
                }
                (RegionKind::Answer { .. }, Symbol::Multiple) => {
                    if let Some(rect) = row_rect(region, row) {
                        draw_hollow_rect_mut(canvas, rect, ORANGE);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Draws the reference rules registration found, across the whole page.
pub fn draw_rules_debug_image_mut(canvas: &mut RgbImage, page: &Page, config: &AlignmentConfig) {
    let (width, height) = (canvas.width() as f32, canvas.height() as f32);
    if let Some(row) = find_horizontal_rule(&page.image, config) {
        draw_line_segment_mut(canvas, (0.0, row as f32), (width, row as f32), PINK);
    }
    if let Some(column) = find_vertical_rule(&page.image, config) {
        draw_line_segment_mut(canvas, (column as f32, 0.0), (column as f32, height), PINK);
    }
}

/// Writes `<stem>_debug_regions.png` next to the page image.
pub fn write_page_debug_image(
    image_path: &Path,
    page: &Page,
    alignment: &AlignmentConfig,
    answer_key: Option<&AnswerKey>,
) -> ImageResult<()> {
    let mut canvas = gray_to_rgb(&page.image);
    draw_regions_debug_image_mut(&mut canvas, &page.regions);
    draw_detections_debug_image_mut(&mut canvas, &page.regions, page.results(), answer_key);
    draw_rules_debug_image_mut(&mut canvas, page, alignment);

    let path = debug_image_path(image_path);
    debug!("writing debug image {}", path.display());
    canvas.save(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::MarkThresholds;
    use crate::image_utils::WHITE;
    use crate::interpret::tests::render_sheet;
    use crate::sheet::SheetTemplate;
    use image::GrayImage;

    #[test]
    fn debug_path_sits_next_to_the_source() {
        let path = debug_image_path(Path::new("/scans/class-3b.png"));
        assert_eq!(path, PathBuf::from("/scans/class-3b_debug_regions.png"));
    }

    #[test]
    fn overlay_marks_correct_and_incorrect_answers() {
        let img = render_sheet(&[Some(0), Some(1)], &[]);
        let mut page = Page::new(0, img, &SheetTemplate::default());
        page.detect(&MarkThresholds::default());

        let key = AnswerKey::parse("AC");
        let mut canvas = gray_to_rgb(&page.image);
        draw_detections_debug_image_mut(&mut canvas, &page.regions, page.results(), Some(&key));

        let region = &page.regions.iter().find(|r| r.id.as_str() == "p0_b1").unwrap();
        let rows = region.row_layout();
        let center = |row: usize, column: u32| {
            let cell = cell_rect(&region.bounds, region.columns, &rows[row], column);
            (
                (cell.left + cell.width as i32 / 2) as u32,
                (cell.top + cell.height as i32 / 2) as u32,
            )
        };

        let (x, y) = center(0, 0);
        assert_eq!(*canvas.get_pixel(x, y), GREEN);
        let (x, y) = center(1, 1);
        assert_eq!(*canvas.get_pixel(x, y), RED);
    }

    #[test]
    fn writes_a_png_next_to_the_page() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("scan.png");
        let page = Page::new(
            0,
            GrayImage::from_pixel(300, 400, WHITE),
            &SheetTemplate::default(),
        );
        write_page_debug_image(&source, &page, &AlignmentConfig::default(), None).unwrap();
        let written = image::open(dir.path().join("scan_debug_regions.png")).unwrap();
        assert_eq!((written.width(), written.height()), (300, 400));
    }

    #[test]
    fn detected_rules_are_drawn() {
        let mut img = GrayImage::from_pixel(200, 400, WHITE);
        for x in 0..200 {
            img.put_pixel(x, 150, image::Luma([0]));
        }
        let page = Page::new(0, img, &SheetTemplate::default());
        let mut canvas = gray_to_rgb(&page.image);
        draw_rules_debug_image_mut(&mut canvas, &page, &AlignmentConfig::default());
        assert_eq!(*canvas.get_pixel(5, 150), PINK);
        assert_eq!(*canvas.get_pixel(5, 151), Rgb([255, 255, 255]));
    }
}
