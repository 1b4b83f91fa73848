//! Visual motion estimation from the camera stream.
//!
//! Frames are downscaled to a fixed working resolution, corners are detected
//! and tracked to the next frame, and the net 2-D displacement is returned as
//! a low-confidence hint used to damp orientation-only drift.

pub mod features;
pub mod frame;
pub mod motion;

pub use frame::{FrameSource, VideoFrame};
pub use motion::{MotionEstimate, VisualMotionEstimator};
