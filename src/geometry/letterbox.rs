//! Object-cover mapping between a video frame and the screen it fills.
//!
//! The video is scaled uniformly until it covers the whole target and is then
//! centered, so exactly one axis overflows and is cropped:
//!
//! ```text
//! scale  = max(target.w / source.w, target.h / source.h)
//! offset = (source * scale - target) / 2
//! screen = normalized * source * scale - offset
//! ```
//!
//! A video wider than the screen aspect overflows horizontally (`offset.x > 0`),
//! a taller one vertically (`offset.y > 0`). Both cases come out of the same
//! function.

use nalgebra::{Point2, Vector2};

use super::projection::Extent;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverTransform {
    source: Extent,
    scale: f64,
    offset: Vector2<f64>,
}

impl CoverTransform {
    /// Fit `source` (video pixels) over `target` (screen pixels).
    pub fn fit(source: Extent, target: Extent) -> Self {
        let scale = (target.width / source.width).max(target.height / source.height);
        let offset = Vector2::new(
            (source.width * scale - target.width) * 0.5,
            (source.height * scale - target.height) * 0.5,
        );
        Self {
            source,
            scale,
            offset,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Pixels of scaled video cropped off the left and top edges.
    pub fn offset(&self) -> Vector2<f64> {
        self.offset
    }

    /// Map a normalized `[0, 1]` video coordinate to screen pixels.
    pub fn to_screen(&self, normalized: &Point2<f64>) -> Point2<f64> {
        Point2::new(
            normalized.x * self.source.width * self.scale - self.offset.x,
            normalized.y * self.source.height * self.scale - self.offset.y,
        )
    }
}
