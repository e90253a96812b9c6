use image::{DynamicImage, GrayImage, Luma, Rgb};
use imageproc::filter::gaussian_blur_f32;
use logging_timer::time;

use crate::layout::SheetLayout;

pub const WHITE: Luma<u8> = Luma([u8::MAX]);
pub const BLACK: Luma<u8> = Luma([u8::MIN]);

/// Mask value for ink (marks, bubble outlines, text).
pub const FOREGROUND: Luma<u8> = WHITE;
/// Mask value for paper.
pub const BACKGROUND: Luma<u8> = BLACK;

pub const WHITE_RGB: Rgb<u8> = Rgb([255, 255, 255]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const DARK_GREEN: Rgb<u8> = Rgb([0, 127, 0]);
pub const ORANGE: Rgb<u8> = Rgb([255, 127, 0]);
pub const PINK: Rgb<u8> = Rgb([255, 0, 255]);
pub const CYAN: Rgb<u8> = Rgb([0, 255, 255]);

pub const RAINBOW: [Rgb<u8>; 6] = [RED, ORANGE, GREEN, CYAN, BLUE, PINK];

/// Collapses a decoded sheet of any color type to 8-bit intensity.
pub fn to_intensity(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Builds the ink mask for a sheet with a locally adaptive threshold.
///
/// Each pixel is compared against a Gaussian-weighted mean of its
/// neighborhood rather than one global level, so a sheet photographed under
/// uneven light still separates ink from paper. Pixels at least
/// `threshold_offset` darker than their local mean become [`FOREGROUND`].
///
/// ```text
///        INTENSITY                     MASK
/// ┌─────────────────────┐  ┌─────────────────────┐
/// │ ░░░░░░░░▒▒▒▒▒▒▓▓▓▓▓ │  │                     │
/// │ ░ ◯ ░ ● ▒ ◯ ▒ ◯ ▓▓▓ │  │   ◯   ●   ◯   ◯     │
/// │ ░░░░░░░░▒▒▒▒▒▒▓▓▓▓▓ │  │                     │
/// └─────────────────────┘  └─────────────────────┘
/// ```
#[time]
pub fn binarize(img: &GrayImage, layout: &SheetLayout) -> GrayImage {
    let local_mean = gaussian_blur_f32(img, layout.threshold_sigma());
    let offset = i16::from(layout.threshold_offset);

    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, pixel) in img.enumerate_pixels() {
        let mean = i16::from(local_mean.get_pixel(x, y).0[0]);
        let value = if i16::from(pixel.0[0]) <= mean - offset {
            FOREGROUND
        } else {
            BACKGROUND
        };
        out.put_pixel(x, y, value);
    }

    log::debug!(
        "binarized {}x{} sheet, {} ink pixels",
        out.width(),
        out.height(),
        count_pixels(&out, &FOREGROUND)
    );
    out
}

/// Determines the number of pixels in an image that match the given luma.
pub fn count_pixels(img: &GrayImage, luma: &Luma<u8>) -> u32 {
    img.pixels().filter(|p| *p == luma).count() as u32
}
