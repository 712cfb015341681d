use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::geometry::{padded_samples, PixelRect};

pub const WHITE: Luma<u8> = Luma([u8::MAX]);
pub const BLACK: Luma<u8> = Luma([u8::MIN]);

pub const GREEN: Rgb<u8> = Rgb([34, 197, 94]);
pub const RED: Rgb<u8> = Rgb([239, 68, 68]);
pub const BLUE: Rgb<u8> = Rgb([59, 130, 246]);
pub const ORANGE: Rgb<u8> = Rgb([249, 115, 22]);
pub const GRAY: Rgb<u8> = Rgb([200, 200, 200]);
pub const PINK: Rgb<u8> = Rgb([255, 0, 255]);

/// Luminance of an RGB pixel, truncated to a byte.
pub fn luminance(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) as u8
}

/// Converts an RGB image to grayscale using [`luminance`].
///
/// `image`'s own `to_luma8` uses different channel weights, and the mark
/// thresholds are calibrated against these ones.
pub fn to_luminance(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([luminance(img.get_pixel(x, y))])
    })
}

/// Darkness counts for a sampled area.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DarkCount {
    pub dark: u32,
    pub total: u32,
}

impl DarkCount {
    pub fn ratio(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.dark as f32 / self.total as f32
        }
    }
}

/// Counts pixels darker than `threshold` inside `cell`, inset on each side by
/// `padding` times the cell size. Samples outside the image are ignored.
pub fn count_dark_pixels(img: &GrayImage, cell: &PixelRect, padding: f32, threshold: u8) -> DarkCount {
    let (width, height) = img.dimensions();
    let mut count = DarkCount::default();

    for py in padded_samples(cell.top, cell.height, padding) {
        let y = py.floor();
        if y < 0.0 || y >= height as f32 {
            continue;
        }
        for px in padded_samples(cell.left, cell.width, padding) {
            let x = px.floor();
            if x < 0.0 || x >= width as f32 {
                continue;
            }
            count.total += 1;
            if img.get_pixel(x as u32, y as u32).0[0] < threshold {
                count.dark += 1;
            }
        }
    }

    count
}

/// The fraction of dark pixels in the padded interior of `cell`.
pub fn fill_ratio(img: &GrayImage, cell: &PixelRect, padding: f32, threshold: u8) -> f32 {
    count_dark_pixels(img, cell, padding, threshold).ratio()
}

/// Expands a grayscale image to RGB so it can be drawn on in color.
pub fn gray_to_rgb(img: &GrayImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let l = img.get_pixel(x, y).0[0];
        Rgb([l, l, l])
    })
}
