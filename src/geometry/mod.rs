//! Geometry shared by every stage of the overlay.
//!
//! # Frame convention
//!
//! Camera space follows the computer-vision RDF convention:
//!
//! ```text
//!        +Y (down)
//!         |
//!         +------ +X (right)
//!        /
//!       +Z (forward, optical axis)
//! ```
//!
//! Screen space has its origin at the top-left corner, x to the right and y
//! down, so camera x/y map onto screen x/y without sign flips.
//!
//! The world frame is the camera frame captured at calibration time. Camera
//! rotations are camera-to-world (`p_world = R · p_cam + t`).

pub mod letterbox;
pub mod projection;
pub mod rotation;

pub use letterbox::CoverTransform;
pub use projection::{Extent, ScreenPosition, ViewProjection};
pub use rotation::{euler_deg_to_quaternion, relative_to_origin};
