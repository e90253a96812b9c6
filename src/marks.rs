use std::collections::BTreeMap;

use image::GrayImage;
use imageproc::{drawing::draw_polygon_mut, point::Point, rect::Rect};
use logging_timer::time;
use serde::{Deserialize, Serialize};

use crate::{
    bubbles::BubbleCandidate,
    geometry::translate_points,
    image_utils::FOREGROUND,
    layout::SheetLayout,
    types::Choice,
};

/// The answers read off one sheet, by 1-based question number. Questions
/// without a filled bubble are absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentResponse(BTreeMap<u32, Choice>);

impl StudentResponse {
    pub fn get(&self, question: u32) -> Option<Choice> {
        self.0.get(&question).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(u32, Choice)> for StudentResponse {
    fn from_iter<I: IntoIterator<Item = (u32, Choice)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A bubble with its position in the grid and how much ink it holds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScoredBubble {
    pub question: u32,
    pub choice: Choice,
    pub bounds: Rect,
    pub fill: u32,
    pub selected: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MarkedSheet {
    pub response: StudentResponse,
    pub bubbles: Vec<ScoredBubble>,
    /// Trailing candidates that did not make up a whole question.
    pub leftover: usize,
}

/// Counts the mask's foreground pixels that lie inside the candidate's
/// outline, border included.
pub fn count_filled_pixels(mask: &GrayImage, candidate: &BubbleCandidate) -> u32 {
    let bounds = candidate.bounds;
    let mut outline = translate_points(&candidate.outline, Point::new(bounds.left(), bounds.top()));
    // polygon filling requires an open outline
    while outline.len() > 1 && outline.first() == outline.last() {
        outline.pop();
    }
    if outline.is_empty() {
        return 0;
    }

    let mut region = GrayImage::new(bounds.width(), bounds.height());
    draw_polygon_mut(&mut region, &outline, FOREGROUND);

    region
        .enumerate_pixels()
        .filter(|(x, y, pixel)| {
            if **pixel != FOREGROUND {
                return false;
            }
            let mask_x = bounds.left() + *x as i32;
            let mask_y = bounds.top() + *y as i32;
            mask_x >= 0
                && mask_y >= 0
                && (mask_x as u32) < mask.width()
                && (mask_y as u32) < mask.height()
                && *mask.get_pixel(mask_x as u32, mask_y as u32) == FOREGROUND
        })
        .count() as u32
}

/// Picks the filled bubble of every question.
///
/// The ordered candidates are split into consecutive groups of
/// `options_per_question`, group `i` being question `i + 1`. Inside a group
/// the candidates are ranked left to right to get their letters. The bubble
/// holding the most ink wins, the first one on a tie, and only counts if it
/// holds more than `fill_threshold` pixels. A second filled bubble in the
/// same question is not reported.
#[time]
pub fn select_marks(
    ordered: &[BubbleCandidate],
    mask: &GrayImage,
    layout: &SheetLayout,
) -> MarkedSheet {
    let groups = ordered.chunks_exact(layout.options_per_question);
    let leftover = groups.remainder().len();

    let mut answers = BTreeMap::new();
    let mut bubbles = Vec::with_capacity(ordered.len() - leftover);

    for (index, group) in groups.enumerate() {
        let question = index as u32 + 1;
        let mut row = group.iter().collect::<Vec<&BubbleCandidate>>();
        row.sort_by_key(|c| c.left());

        let fills = row
            .iter()
            .map(|c| count_filled_pixels(mask, c))
            .collect::<Vec<u32>>();

        let mut darkest: Option<(usize, u32)> = None;
        for (rank, &fill) in fills.iter().enumerate() {
            if darkest.map_or(true, |(_, best)| fill > best) {
                darkest = Some((rank, fill));
            }
        }

        let selected = darkest
            .filter(|&(_, fill)| fill > layout.fill_threshold)
            .map(|(rank, _)| rank);

        for (rank, (candidate, fill)) in row.iter().zip(&fills).enumerate() {
            if let Some(choice) = Choice::from_index(rank) {
                bubbles.push(ScoredBubble {
                    question,
                    choice,
                    bounds: candidate.bounds,
                    fill: *fill,
                    selected: selected == Some(rank),
                });
            }
        }

        match selected.and_then(Choice::from_index) {
            Some(choice) => {
                answers.insert(question, choice);
            }
            None => log::trace!("question {} has no mark (fills {:?})", question, fills),
        }
    }

    MarkedSheet {
        response: StudentResponse(answers),
        bubbles,
        leftover,
    }
}
