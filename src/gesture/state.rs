//! Published gesture snapshot.

use nalgebra::Point2;
use serde::Serialize;

use crate::anchors::AnchorId;

use super::hit_test::TargetHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GesturePhase {
    #[default]
    Idle,
    PinchDown,
    Dragging,
}

impl GesturePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PinchDown => "pinch-down",
            Self::Dragging => "dragging",
        }
    }
}

impl std::fmt::Display for GesturePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which input drove the state machine this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GestureSource {
    Hand,
    Pointer,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PinchEdge {
    Start,
    End,
}

/// A click synthesized from a pinch on a non-anchor element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClickEvent {
    pub position: Point2<f64>,
    pub target: TargetHandle,
}

/// Gesture snapshot, rebuilt every tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GestureState {
    pub hand_detected: bool,
    pub pinching: bool,
    pub phase: GesturePhase,
    pub source: GestureSource,
    /// Set only while pinching, when the pinch began on a drag handle.
    pub dragged_anchor_id: Option<AnchorId>,
    /// Where the current pinch began. Logging only.
    pub drag_start_screen_pos: Option<Point2<f64>>,
    /// Screen position of the pinch point (or pointer) this tick.
    pub cursor: Option<Point2<f64>>,
    pub edge: Option<PinchEdge>,
}
