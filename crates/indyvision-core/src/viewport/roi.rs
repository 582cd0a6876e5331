//! Region-of-interest rectangles in image pixel space.

use serde::{Deserialize, Serialize};

use super::Point;

/// Axis-aligned rectangle in image pixel space.
///
/// Built through [`RoiRect::from_corners`], width and height are never
/// negative regardless of which corner the drag started from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoiRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RoiRect {
    /// Normalize two corners into `(min x, min y, |dx|, |dy|)`.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    /// True when the rectangle has no area; crop and save ignore such rects.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}
