use imageproc::contours::Contour;
use imageproc::point::Point;
use imageproc::rect::Rect;

/// Smallest axis-aligned rect containing every point of the contour.
///
/// Returns `None` for an empty contour.
pub fn get_contour_bounding_rect(contour: &Contour<i32>) -> Option<Rect> {
    let first = contour.points.first()?;
    let (min_x, min_y, max_x, max_y) = contour.points.iter().fold(
        (first.x, first.y, first.x, first.y),
        |(min_x, min_y, max_x, max_y), p| {
            (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
        },
    );
    let width = (max_x - min_x + 1) as u32;
    let height = (max_y - min_y + 1) as u32;
    Some(Rect::at(min_x, min_y).of_size(width, height))
}

pub fn aspect_ratio(rect: &Rect) -> f32 {
    rect.width() as f32 / rect.height() as f32
}

pub fn center_of_rect(rect: &Rect) -> Point<f32> {
    Point::new(
        rect.left() as f32 + rect.width() as f32 / 2.0,
        rect.top() as f32 + rect.height() as f32 / 2.0,
    )
}

/// Moves every point so that `origin` becomes (0, 0).
pub fn translate_points(points: &[Point<i32>], origin: Point<i32>) -> Vec<Point<i32>> {
    points
        .iter()
        .map(|p| Point::new(p.x - origin.x, p.y - origin.y))
        .collect()
}
