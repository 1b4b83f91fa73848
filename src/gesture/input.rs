//! Per-tick gesture inputs: hand landmarks and the pointer fallback.

use anyhow::{bail, Result};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;
pub const LANDMARK_COUNT: usize = 21;

/// One detected hand: 21 points in normalized video coordinates.
///
/// `x`/`y` are in `[0, 1]` of the video frame (origin top-left); `z` is the
/// detector's relative depth and is not consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LandmarkRecord")]
pub struct HandLandmarks {
    points: Vec<Point3<f64>>,
}

/// Wire form of [`HandLandmarks`], checked on the way in.
#[derive(Deserialize)]
struct LandmarkRecord {
    points: Vec<Point3<f64>>,
}

impl TryFrom<LandmarkRecord> for HandLandmarks {
    type Error = anyhow::Error;

    fn try_from(record: LandmarkRecord) -> Result<Self> {
        Self::from_points(record.points)
    }
}

impl HandLandmarks {
    pub fn from_points(points: Vec<Point3<f64>>) -> Result<Self> {
        if points.len() != LANDMARK_COUNT {
            bail!(
                "hand landmarks need {} points, got {}",
                LANDMARK_COUNT,
                points.len()
            );
        }
        Ok(Self { points })
    }

    /// Build a hand from its two fingertips only. Every other joint collapses
    /// onto the index tip.
    pub fn from_tips(index_tip: Point2<f64>, thumb_tip: Point2<f64>) -> Self {
        let mut points = vec![Point3::new(index_tip.x, index_tip.y, 0.0); LANDMARK_COUNT];
        points[THUMB_TIP] = Point3::new(thumb_tip.x, thumb_tip.y, 0.0);
        Self { points }
    }

    pub fn point(&self, index: usize) -> Option<&Point3<f64>> {
        self.points.get(index)
    }

    pub fn index_tip(&self) -> Point2<f64> {
        self.point(INDEX_TIP).map_or_else(Point2::origin, |p| p.xy())
    }

    pub fn thumb_tip(&self) -> Point2<f64> {
        self.point(THUMB_TIP).map_or_else(Point2::origin, |p| p.xy())
    }

    /// Planar distance between index and thumb tips (normalized units).
    pub fn pinch_distance(&self) -> f64 {
        nalgebra::distance(&self.index_tip(), &self.thumb_tip())
    }
}

/// Mouse (or touch) state as last reported by the platform, in screen pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerState {
    pub x: f64,
    pub y: f64,
    pub button_down: bool,
}

impl PointerState {
    pub fn new(x: f64, y: f64, button_down: bool) -> Self {
        Self { x, y, button_down }
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pinch_distance_uses_tips() {
        let hand = HandLandmarks::from_tips(Point2::new(0.5, 0.5), Point2::new(0.53, 0.54));
        assert_relative_eq!(hand.pinch_distance(), 0.05, epsilon = 1e-12);
        assert_eq!(hand.index_tip(), Point2::new(0.5, 0.5));
    }

    #[test]
    fn test_from_points_checks_count() {
        assert!(HandLandmarks::from_points(vec![Point3::origin(); 5]).is_err());
        let mut points = vec![Point3::origin(); LANDMARK_COUNT];
        points[INDEX_TIP] = Point3::new(0.2, 0.3, -0.1);
        let hand = HandLandmarks::from_points(points).unwrap();
        assert_eq!(hand.index_tip(), Point2::new(0.2, 0.3));
        assert_eq!(hand.point(WRIST), Some(&Point3::origin()));
        assert!(hand.point(LANDMARK_COUNT).is_none());
    }

    #[test]
    fn test_deserialize_rejects_short_hand() {
        let parsed: Result<HandLandmarks, _> = serde_json::from_str(r#"{"points":[[0.5,0.5,0.0]]}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_deserialize_accepts_full_hand() {
        let hand = HandLandmarks::from_tips(Point2::new(0.4, 0.6), Point2::new(0.42, 0.6));
        let json = serde_json::to_string(&hand).unwrap();
        let parsed: HandLandmarks = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hand);
        assert_relative_eq!(parsed.pinch_distance(), 0.02, epsilon = 1e-12);
    }
}
