//! Tick orchestration and thread management.
//!
//! This module contains the [`FrameCoordinator`] that drives the pipeline once
//! per display refresh, the shared input cells written by sensor callbacks,
//! the hand-detector providers and the published per-tick result.

pub mod detector;
pub mod frame_coordinator;
pub mod result;
pub mod shared_state;

pub use detector::{
    landmark_provider, DetectorFactory, DetectorWorker, HandLandmarkDetector, InlineLandmarks,
    LandmarkProvider,
};
pub use frame_coordinator::{FrameCoordinator, WindowPlacement};
pub use result::{MotionSummary, TickResult, TickTiming};
pub use shared_state::{LatestCell, SharedInputs};
