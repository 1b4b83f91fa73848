//! Pinhole projection between camera space and screen pixels.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::config::ProjectionConfig;

/// Width/height pair in pixels (screens, viewports, video frames).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub width: f64,
    pub height: f64,
}

impl Extent {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.width * 0.5, self.height * 0.5)
    }

    /// True when both sides are positive and finite.
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Where an anchor lands on screen this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPosition {
    pub x: f64,
    pub y: f64,
    pub visible: bool,
    /// Distance along the optical axis (meters).
    pub depth: f64,
}

/// Screen-space projection for a fixed viewport.
#[derive(Debug, Clone, Copy)]
pub struct ViewProjection {
    viewport: Extent,
    focal_px: f64,
    near_clip: f64,
    far_clip: f64,
    near_epsilon: f64,
}

impl ViewProjection {
    /// Build a projection. The focal length is derived so that an object of
    /// `reference_width_m` at `reference_distance_m` spans `span_fraction` of
    /// the viewport width.
    pub fn new(viewport: Extent, config: &ProjectionConfig) -> Self {
        let viewport = Extent::new(viewport.width.max(1.0), viewport.height.max(1.0));
        let focal_px = config.span_fraction * viewport.width * config.reference_distance_m
            / config.reference_width_m;
        Self {
            viewport,
            focal_px,
            near_clip: config.near_clip_m,
            far_clip: config.far_clip_m,
            near_epsilon: config.near_epsilon_m,
        }
    }

    pub fn viewport(&self) -> Extent {
        self.viewport
    }

    pub fn focal_px(&self) -> f64 {
        self.focal_px
    }

    /// Visible depth range is `(near_clip, far_clip]`; the near plane itself
    /// is excluded.
    #[inline]
    pub fn is_within_clip(&self, depth: f64) -> bool {
        depth > self.near_clip && depth <= self.far_clip
    }

    /// Project a point expressed in the camera frame.
    ///
    /// Points at or behind `near_epsilon` are not divided; they come back
    /// invisible with an off-screen position pointing toward the point.
    pub fn project(&self, p_cam: &Vector3<f64>) -> ScreenPosition {
        let (cx, cy) = self.viewport.center();
        let depth = p_cam.z;

        if depth <= self.near_epsilon {
            let lateral = (p_cam.x * p_cam.x + p_cam.y * p_cam.y).sqrt();
            let (x, y) = if lateral > f64::EPSILON {
                (
                    cx + p_cam.x / lateral * self.viewport.width,
                    cy + p_cam.y / lateral * self.viewport.height,
                )
            } else {
                (cx, cy)
            };
            return ScreenPosition {
                x,
                y,
                visible: false,
                depth,
            };
        }

        ScreenPosition {
            x: cx + p_cam.x / depth * self.focal_px,
            y: cy + p_cam.y / depth * self.focal_px,
            visible: self.is_within_clip(depth),
            depth,
        }
    }

    /// Inverse of [`project`](Self::project) for a pixel at a given depth.
    pub fn unproject(&self, x: f64, y: f64, depth: f64) -> Vector3<f64> {
        let (cx, cy) = self.viewport.center();
        Vector3::new(
            (x - cx) * depth / self.focal_px,
            (y - cy) * depth / self.focal_px,
            depth,
        )
    }
}
