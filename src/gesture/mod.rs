//! Gesture interaction: pinch-to-drag for anchored windows, pinch-to-click
//! for everything else, with a mouse fallback when no hand is visible.

pub mod controller;
pub mod input;
pub mod state;

pub use controller::{GestureController, GestureInput, GestureUpdate};
pub use hit_test::{HitTester, NoHitTargets, PanelLayout, Rect, TargetHandle};
pub use input::{HandLandmarks, PointerState, INDEX_TIP, LANDMARK_COUNT, THUMB_TIP};
pub use state::{ClickEvent, GesturePhase, GestureSource, GestureState, PinchEdge};
