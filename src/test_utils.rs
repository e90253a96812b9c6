//! Synthetic answer sheets for tests.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut};
use imageproc::rect::Rect;

use crate::types::Choice;

const INK: Rgb<u8> = Rgb([0, 0, 0]);

pub const BUBBLE_RADIUS: i32 = 11;
const MARGIN: i32 = 60;
const OPTION_SPACING: i32 = 40;
const COLUMN_SPACING: i32 = 230;
const ROW_SPACING: i32 = 40;

/// Paper that darkens from left to right, as under a desk lamp.
pub fn blank_paper(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        let shade = 255 - (55 * x / width.max(1)) as u8;
        Rgb([shade, shade, shade])
    })
}

pub fn draw_bubble(canvas: &mut RgbImage, center: (i32, i32), filled: bool) {
    if filled {
        draw_filled_circle_mut(canvas, center, BUBBLE_RADIUS, INK);
    } else {
        draw_hollow_circle_mut(canvas, center, BUBBLE_RADIUS, INK);
    }
}

/// Draws a sheet of `columns` page columns with `rows` questions each,
/// numbered down each column first. `answers[i]` is the mark for question
/// `i + 1`; questions past the end of `answers` are left blank.
pub fn draw_answer_sheet(columns: i32, rows: i32, answers: &[Option<Choice>]) -> RgbImage {
    let width = (2 * MARGIN
        + (columns - 1) * COLUMN_SPACING
        + 3 * OPTION_SPACING
        + 2 * BUBBLE_RADIUS) as u32;
    let height = (2 * MARGIN + (rows - 1) * ROW_SPACING + 2 * BUBBLE_RADIUS) as u32;
    let mut canvas = blank_paper(width, height + 30);

    // a title rule above the grid, too wide to pass as a bubble
    draw_filled_rect_mut(&mut canvas, Rect::at(MARGIN, 15).of_size(width / 2, 6), INK);

    for column in 0..columns {
        for row in 0..rows {
            let question = (column * rows + row) as usize;
            let mark = answers.get(question).copied().flatten();
            for choice in Choice::ALL {
                let center = (
                    MARGIN
                        + BUBBLE_RADIUS
                        + column * COLUMN_SPACING
                        + choice.index() as i32 * OPTION_SPACING,
                    30 + MARGIN + BUBBLE_RADIUS + row * ROW_SPACING,
                );
                draw_bubble(&mut canvas, center, mark == Some(choice));
            }
        }
    }

    canvas
}

/// Draws `count` empty bubbles in rows of four.
pub fn draw_empty_bubbles(count: usize) -> RgbImage {
    let rows = ((count + 3) / 4) as i32;
    let mut canvas = blank_paper(
        (2 * MARGIN + 3 * OPTION_SPACING + 2 * BUBBLE_RADIUS) as u32,
        (2 * MARGIN + rows * ROW_SPACING) as u32,
    );
    for i in 0..count as i32 {
        let center = (
            MARGIN + BUBBLE_RADIUS + (i % 4) * OPTION_SPACING,
            MARGIN + BUBBLE_RADIUS + (i / 4) * ROW_SPACING,
        );
        draw_bubble(&mut canvas, center, false);
    }
    canvas
}

/// A repeating A, B, C, D, blank pattern over `count` questions.
pub fn answer_pattern(count: usize) -> Vec<Option<Choice>> {
    (0..count)
        .map(|i| Choice::from_index(i % 5))
        .collect()
}
