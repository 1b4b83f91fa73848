//! World-locked anchors.
//!
//! An anchor is created from a screen position and a depth, stored in the
//! calibrated world frame, and re-projected every tick through the current
//! [`CameraPose`].

pub mod anchor;
pub mod pose;
pub mod registry;
pub mod types;

pub use anchor::Anchor;
pub use pose::{rotation_compensated_hint, rotation_flow, update_camera_pose, CameraPose};
pub use registry::AnchorRegistry;
pub use types::AnchorId;
