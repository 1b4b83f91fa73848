//! Corner detection on the working-resolution luma image.
//!
//! Shi–Tomasi scoring (minimum eigenvalue of the gradient structure tensor
//! over a 5×5 window), with at most one corner kept per grid cell so that the
//! features spread over the whole frame.

use image::GrayImage;
use nalgebra::Point2;

use crate::config::MotionConfig;

/// Half-size of the structure tensor window.
const TENSOR_RADIUS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub position: Point2<u32>,
    /// Minimum eigenvalue per window pixel.
    pub score: f32,
}

impl Corner {
    pub fn to_f32(&self) -> Point2<f32> {
        Point2::new(self.position.x as f32, self.position.y as f32)
    }
}

/// Distance from the image border inside which no corner is reported, so
/// that patch comparisons over the whole search window stay in bounds.
pub fn border_margin(config: &MotionConfig) -> u32 {
    (config.patch_radius + config.search_radius + 1).max(TENSOR_RADIUS + 1)
}

/// Detect up to `config.max_features` corners, strongest first.
pub fn detect_corners(image: &GrayImage, config: &MotionConfig) -> Vec<Corner> {
    let (w, h) = image.dimensions();
    let margin = border_margin(config);
    if w <= 2 * margin || h <= 2 * margin || config.grid_cols == 0 || config.grid_rows == 0 {
        return Vec::new();
    }

    let (gx, gy) = gradients(image);
    let idx = |x: u32, y: u32| (y * w + x) as usize;

    let inner_w = w - 2 * margin;
    let inner_h = h - 2 * margin;
    let cols = config.grid_cols.min(inner_w);
    let rows = config.grid_rows.min(inner_h);
    let mut best: Vec<Option<Corner>> = vec![None; (cols * rows) as usize];

    let window_area = ((2 * TENSOR_RADIUS + 1) * (2 * TENSOR_RADIUS + 1)) as f32;

    for y in margin..(h - margin) {
        for x in margin..(w - margin) {
            let mut sxx = 0.0f32;
            let mut syy = 0.0f32;
            let mut sxy = 0.0f32;
            for wy in (y - TENSOR_RADIUS)..=(y + TENSOR_RADIUS) {
                for wx in (x - TENSOR_RADIUS)..=(x + TENSOR_RADIUS) {
                    let dx = gx[idx(wx, wy)];
                    let dy = gy[idx(wx, wy)];
                    sxx += dx * dx;
                    syy += dy * dy;
                    sxy += dx * dy;
                }
            }
            let score = min_eigenvalue(sxx, sxy, syy) / window_area;
            if score < config.min_corner_score {
                continue;
            }

            let col = ((x - margin) * cols / inner_w).min(cols - 1);
            let row = ((y - margin) * rows / inner_h).min(rows - 1);
            let cell = &mut best[(row * cols + col) as usize];
            if cell.map_or(true, |c| score > c.score) {
                *cell = Some(Corner {
                    position: Point2::new(x, y),
                    score,
                });
            }
        }
    }

    let mut corners: Vec<Corner> = best.into_iter().flatten().collect();
    corners.sort_by(|a, b| b.score.total_cmp(&a.score));
    corners.truncate(config.max_features);
    corners
}

/// Central-difference gradients; zero on the one-pixel border.
fn gradients(image: &GrayImage) -> (Vec<f32>, Vec<f32>) {
    let (w, h) = image.dimensions();
    let mut gx = vec![0.0f32; (w * h) as usize];
    let mut gy = vec![0.0f32; (w * h) as usize];
    if w < 3 || h < 3 {
        return (gx, gy);
    }
    let px = |x: u32, y: u32| image.get_pixel(x, y).0[0] as f32;
    for y in 1..(h - 1) {
        for x in 1..(w - 1) {
            let i = (y * w + x) as usize;
            gx[i] = (px(x + 1, y) - px(x - 1, y)) * 0.5;
            gy[i] = (px(x, y + 1) - px(x, y - 1)) * 0.5;
        }
    }
    (gx, gy)
}

#[inline]
fn min_eigenvalue(a: f32, b: f32, c: f32) -> f32 {
    let half_trace = (a + c) * 0.5;
    let half_diff = (a - c) * 0.5;
    half_trace - (half_diff * half_diff + b * b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_flat_image_has_no_corners() {
        let img = GrayImage::from_pixel(320, 240, Luma([90u8]));
        assert!(detect_corners(&img, &MotionConfig::default()).is_empty());
    }

    #[test]
    fn test_edge_is_not_a_corner() {
        // A single vertical edge has one strong eigenvalue only.
        let img = GrayImage::from_fn(320, 240, |x, _| if x < 160 { Luma([0]) } else { Luma([255]) });
        assert!(detect_corners(&img, &MotionConfig::default()).is_empty());
    }

    #[test]
    fn test_square_corners_detected() {
        let img = GrayImage::from_fn(320, 240, |x, y| {
            if (100..200).contains(&x) && (80..160).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        let corners = detect_corners(&img, &MotionConfig::default());
        assert!(!corners.is_empty());
        // Every reported corner sits near one of the square's four corners.
        let targets = [(100.0, 80.0), (199.0, 80.0), (100.0, 159.0), (199.0, 159.0)];
        for c in &corners {
            let p = c.to_f32();
            let near = targets
                .iter()
                .any(|(tx, ty)| (p.x - tx).abs() <= 3.0 && (p.y - ty).abs() <= 3.0);
            assert!(near, "unexpected corner at {:?}", p);
        }
    }

    #[test]
    fn test_corners_respect_margin_and_budget() {
        let config = MotionConfig {
            max_features: 5,
            ..MotionConfig::default()
        };
        let img = GrayImage::from_fn(320, 240, |x, y| Luma([(((x / 4) + (y / 4)) % 2 * 255) as u8]));
        let corners = detect_corners(&img, &config);
        assert!(corners.len() <= 5);
        let margin = border_margin(&config);
        for c in &corners {
            assert!(c.position.x >= margin && c.position.x < 320 - margin);
            assert!(c.position.y >= margin && c.position.y < 240 - margin);
        }
        for pair in corners.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}
