//! Frame-to-frame visual motion hint.
//!
//! Corners found in the previous working-resolution frame are searched for in
//! the current frame by exhaustive SAD patch matching inside a small window.
//! The hint is the per-axis median displacement of the accepted matches. It
//! is an advisory, confidence-free 2-D estimate, not an odometry solve.

use image::{imageops, GrayImage};
use nalgebra::{Point2, Vector2};
use tracing::debug;

use crate::config::MotionConfig;

use super::features::{detect_corners, Corner};
use super::frame::VideoFrame;

/// Output of one [`VisualMotionEstimator::process_frame`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionEstimate {
    /// Corners of the current frame (working-resolution pixels).
    pub points: Vec<Point2<f32>>,
    /// Median image displacement since the previous frame (working-resolution
    /// pixels). Zero when it could not be estimated.
    pub motion_hint: Vector2<f32>,
    /// Number of accepted correspondences behind the hint.
    pub matches: usize,
}

impl MotionEstimate {
    fn without_hint(points: Vec<Point2<f32>>) -> Self {
        Self {
            points,
            motion_hint: Vector2::zeros(),
            matches: 0,
        }
    }

    pub fn has_hint(&self) -> bool {
        self.motion_hint != Vector2::zeros()
    }
}

struct PreviousFrame {
    image: GrayImage,
    corners: Vec<Corner>,
}

pub struct VisualMotionEstimator {
    config: MotionConfig,
    previous: Option<PreviousFrame>,
}

impl VisualMotionEstimator {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            previous: None,
        }
    }

    /// Process the next frame. Never fails; degraded input yields a zero hint.
    pub fn process_frame(&mut self, frame: &VideoFrame) -> MotionEstimate {
        let image = self.to_working_resolution(frame.image());
        let corners = detect_corners(&image, &self.config);
        let points: Vec<Point2<f32>> = corners.iter().map(Corner::to_f32).collect();

        let estimate = match self.previous.take() {
            Some(prev) => self.estimate_motion(&prev, &image, points),
            None => MotionEstimate::without_hint(points),
        };

        self.previous = Some(PreviousFrame { image, corners });
        estimate
    }

    /// Forget the previous frame; the next call yields a zero hint.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    fn to_working_resolution(&self, image: &GrayImage) -> GrayImage {
        let (w, h) = (self.config.work_width, self.config.work_height);
        if image.dimensions() == (w, h) {
            image.clone()
        } else {
            imageops::resize(image, w, h, imageops::FilterType::Triangle)
        }
    }

    fn estimate_motion(
        &self,
        prev: &PreviousFrame,
        current: &GrayImage,
        points: Vec<Point2<f32>>,
    ) -> MotionEstimate {
        let mut dxs = Vec::with_capacity(prev.corners.len());
        let mut dys = Vec::with_capacity(prev.corners.len());

        for corner in &prev.corners {
            if let Some((dx, dy)) = track_patch(&prev.image, current, corner.position, &self.config) {
                dxs.push(dx as f32);
                dys.push(dy as f32);
            }
        }

        let matches = dxs.len();
        if matches < self.config.min_matches {
            debug!(
                matches,
                corners = prev.corners.len(),
                "Too few feature matches for a motion hint"
            );
            return MotionEstimate::without_hint(points);
        }

        MotionEstimate {
            points,
            motion_hint: Vector2::new(median(&mut dxs), median(&mut dys)),
            matches,
        }
    }
}

/// Best integer displacement of the patch around `at` from `prev` to `curr`,
/// or None when even the best candidate differs too much.
///
/// `at` must lie at least `patch_radius + search_radius` pixels inside both
/// images.
fn track_patch(
    prev: &GrayImage,
    curr: &GrayImage,
    at: Point2<u32>,
    config: &MotionConfig,
) -> Option<(i32, i32)> {
    let pr = config.patch_radius as i32;
    let sr = config.search_radius as i32;
    let (w, h) = curr.dimensions();
    let (x0, y0) = (at.x as i32, at.y as i32);
    if x0 - pr - sr < 0 || y0 - pr - sr < 0 || x0 + pr + sr >= w as i32 || y0 + pr + sr >= h as i32 {
        return None;
    }

    let patch_area = ((2 * pr + 1) * (2 * pr + 1)) as f32;
    let mut best: Option<(u32, i32, i32)> = None;

    for dy in -sr..=sr {
        for dx in -sr..=sr {
            let mut sad = 0u32;
            for py in -pr..=pr {
                for px in -pr..=pr {
                    let a = prev.get_pixel((x0 + px) as u32, (y0 + py) as u32).0[0];
                    let b = curr.get_pixel((x0 + dx + px) as u32, (y0 + dy + py) as u32).0[0];
                    sad += a.abs_diff(b) as u32;
                }
            }
            // Ties prefer the smaller displacement.
            let better = match best {
                None => true,
                Some((best_sad, bdx, bdy)) => {
                    sad < best_sad
                        || (sad == best_sad && dx * dx + dy * dy < bdx * bdx + bdy * bdy)
                }
            };
            if better {
                best = Some((sad, dx, dy));
            }
        }
    }

    let (sad, dx, dy) = best?;
    if sad as f32 / patch_area > config.max_mean_abs_diff {
        return None;
    }
    Some((dx, dy))
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}
