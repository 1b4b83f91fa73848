//! Video frames as consumed by the core: 8-bit luma pixels plus dimensions.

use std::sync::Arc;

use anyhow::{Context, Result};
use image::{imageops, GrayImage, RgbaImage};

use crate::geometry::Extent;
use crate::system::shared_state::LatestCell;

/// A decoded camera frame. Cloning shares the pixel buffer.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    image: Arc<GrayImage>,
    timestamp_ms: f64,
}

impl VideoFrame {
    pub fn new(image: GrayImage, timestamp_ms: f64) -> Self {
        Self {
            image: Arc::new(image),
            timestamp_ms,
        }
    }

    /// Build from a tightly packed RGBA buffer (as handed out by most
    /// camera/video APIs).
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>, timestamp_ms: f64) -> Result<Self> {
        let rgba = RgbaImage::from_raw(width, height, pixels)
            .with_context(|| format!("RGBA buffer does not match {}x{}", width, height))?;
        Ok(Self::new(imageops::grayscale(&rgba), timestamp_ms))
    }

    /// Uniform gray frame of the given size.
    pub fn blank(width: u32, height: u32, timestamp_ms: f64) -> Self {
        Self::new(GrayImage::from_pixel(width, height, image::Luma([128u8])), timestamp_ms)
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.image.width() as f64, self.image.height() as f64)
    }

    pub fn timestamp_ms(&self) -> f64 {
        self.timestamp_ms
    }
}

/// Polled once per tick for the most recent decoded frame.
pub trait FrameSource {
    fn latest_frame(&mut self) -> Option<VideoFrame>;
}

/// The newest published frame, consumed by the poll. Frames published
/// faster than the tick polls are skipped.
impl FrameSource for LatestCell<VideoFrame> {
    fn latest_frame(&mut self) -> Option<VideoFrame> {
        self.take()
    }
}
