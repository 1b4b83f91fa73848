//! Per-tick output handed to the render layer.
//!
//! Everything here is plain data: cloned out of the coordinator and safe to
//! serialize or send to another thread.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::anchors::{AnchorId, CameraPose};
use crate::calibration::CalibrationPhase;
use crate::geometry::ScreenPosition;
use crate::gesture::{ClickEvent, GestureState};

/// Snapshot published at the end of a tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickResult {
    pub tick: u64,
    pub timestamp_ms: f64,
    /// Screen positions of open windows. Windows without an anchor are absent.
    pub anchors: BTreeMap<AnchorId, ScreenPosition>,
    pub gesture: GestureState,
    /// Clicks synthesized from pinches this tick.
    pub clicks: Vec<ClickEvent>,
    pub pose: CameraPose,
    pub calibrated: bool,
    pub calibration: CalibrationPhase,
    pub sensor_active: bool,
    pub motion: Option<MotionSummary>,
    pub timing: TickTiming,
}

/// What the visual motion estimator contributed this tick.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MotionSummary {
    pub features: usize,
    pub matches: usize,
    /// Raw median image motion (working-resolution pixels).
    pub hint_x: f32,
    pub hint_y: f32,
    /// Motion left after removing what the measured rotation explains; this
    /// is what reaches the pose.
    pub residual_x: f32,
    pub residual_y: f32,
}

/// Timing breakdown for a tick.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TickTiming {
    /// Time since the previous tick, as given by the caller's clock.
    pub since_last_ms: Option<f64>,
    pub total_ms: f64,
    pub pose_ms: f64,
    pub gesture_ms: f64,
}
