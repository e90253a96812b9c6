use image::GrayImage;
use imageproc::{
    contours::{find_contours, BorderType},
    point::Point,
    rect::Rect,
};
use logging_timer::time;

use crate::{
    geometry::{aspect_ratio, get_contour_bounding_rect},
    layout::SheetLayout,
};

/// A connected ink region shaped like an answer bubble.
#[derive(Clone, Debug, PartialEq)]
pub struct BubbleCandidate {
    pub bounds: Rect,
    /// Border pixels of the region, in tracing order.
    pub outline: Vec<Point<i32>>,
}

impl BubbleCandidate {
    pub fn left(&self) -> i32 {
        self.bounds.left()
    }

    pub fn top(&self) -> i32 {
        self.bounds.top()
    }
}

/// Finds every outermost ink region in the mask that could be a bubble.
///
/// Regions nested inside another region's hole are ignored, as are regions
/// rejected by [`rect_could_be_bubble`]. The result is in contour tracing
/// order, which carries no meaning for the sheet layout.
#[time]
pub fn find_bubble_candidates(mask: &GrayImage, layout: &SheetLayout) -> Vec<BubbleCandidate> {
    let contours = find_contours::<i32>(mask);
    let total = contours.len();

    let candidates = contours
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .filter_map(|contour| {
            let bounds = get_contour_bounding_rect(&contour)?;
            if rect_could_be_bubble(layout, &bounds) {
                Some(BubbleCandidate {
                    bounds,
                    outline: contour.points,
                })
            } else {
                None
            }
        })
        .collect::<Vec<BubbleCandidate>>();

    log::debug!(
        "accepted {} of {} contours as bubble candidates",
        candidates.len(),
        total
    );
    candidates
}

/// Determines whether a rect could be a bubble based on its size and shape.
///
/// Staple marks, text strokes and scan dust are either too small or too far
/// from square to pass.
pub fn rect_could_be_bubble(layout: &SheetLayout, rect: &Rect) -> bool {
    rect.width() >= layout.min_bubble_size.width
        && rect.height() >= layout.min_bubble_size.height
        && layout.aspect_ratio.contains(aspect_ratio(rect))
}
