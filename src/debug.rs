use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_filled_rect_mut, draw_hollow_rect_mut};

use crate::{
    bubbles::BubbleCandidate,
    geometry::center_of_rect,
    image_utils::{DARK_GREEN, FOREGROUND, RAINBOW, RED, WHITE_RGB},
    marks::ScoredBubble,
};

/// Creates a path for a debug image.
pub fn debug_image_path(base: &Path, label: &str) -> PathBuf {
    let mut result = PathBuf::from(base);
    result.set_file_name(format!(
        "{}_debug_{}.png",
        base.file_stem().unwrap_or_default().to_string_lossy(),
        label
    ));
    result
}

/// Writes labeled debug images next to a sheet's image, or does nothing if
/// disabled.
pub struct ImageDebugWriter {
    input_path: PathBuf,
    input_image: Option<GrayImage>,
}

impl ImageDebugWriter {
    pub fn new(input_path: PathBuf, input_image: GrayImage) -> Self {
        Self {
            input_path,
            input_image: Some(input_image),
        }
    }

    pub fn disabled() -> Self {
        Self {
            input_path: PathBuf::new(),
            input_image: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.input_image.is_some()
    }

    /// Draws on a color copy of the sheet and saves it. Returns the path
    /// written, if any.
    pub fn write(&self, label: &str, draw: impl FnOnce(&mut RgbImage)) -> Option<PathBuf> {
        let input_image = self.input_image.as_ref()?;
        let mut canvas = DynamicImage::ImageLuma8(input_image.clone()).into_rgb8();
        draw(&mut canvas);

        let path = debug_image_path(&self.input_path, label);
        match canvas.save(&path) {
            Ok(()) => {
                log::debug!("wrote debug image {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::warn!("unable to write debug image {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Paints every foreground pixel of the mask.
pub fn draw_mask_debug_image_mut(canvas: &mut RgbImage, mask: &GrayImage) {
    for (x, y, pixel) in mask.enumerate_pixels() {
        if *pixel == FOREGROUND && x < canvas.width() && y < canvas.height() {
            canvas.put_pixel(x, y, RED);
        }
    }
}

/// Outlines all candidates in the order they will be read.
pub fn draw_candidate_rects_debug_image_mut(canvas: &mut RgbImage, candidates: &[BubbleCandidate]) {
    for (i, candidate) in candidates.iter().enumerate() {
        draw_hollow_rect_mut(canvas, candidate.bounds, RAINBOW[i % RAINBOW.len()]);
    }
}

/// Outlines each question's bubbles in a shared color and fills the bubble
/// read as the answer.
pub fn draw_scored_bubbles_debug_image_mut(canvas: &mut RgbImage, bubbles: &[ScoredBubble]) {
    for bubble in bubbles {
        let color = RAINBOW[(bubble.question as usize - 1) % RAINBOW.len()];
        if bubble.selected {
            draw_filled_rect_mut(canvas, bubble.bounds, DARK_GREEN);
        }
        draw_hollow_rect_mut(canvas, bubble.bounds, color);

        let center = center_of_rect(&bubble.bounds);
        draw_cross_mut(
            canvas,
            WHITE_RGB,
            center.x.round() as i32,
            center.y.round() as i32,
        );
    }
}
