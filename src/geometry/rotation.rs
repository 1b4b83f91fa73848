//! Euler angle convention shared by the whole pipeline.
//!
//! All rotations are camera-to-world and live in the camera frame convention
//! described in [`crate::geometry`] (RDF: x right, y down, z forward).
//!
//! Device orientation arrives as intrinsic yaw → pitch → roll in degrees:
//!
//! ```text
//! R = Ry(yaw) · Rx(pitch) · Rz(roll)
//! ```
//!
//! - yaw:   about the vertical axis (camera +Y). Positive turns the view right.
//! - pitch: about the lateral axis (camera +X). Positive tilts the view up.
//! - roll:  about the optical axis (camera +Z).

use nalgebra::{UnitQuaternion, Vector3};

/// Convert a yaw/pitch/roll reading (degrees) to a camera-to-world rotation.
pub fn euler_deg_to_quaternion(yaw_deg: f64, pitch_deg: f64, roll_deg: f64) -> UnitQuaternion<f64> {
    let yaw = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw_deg.to_radians());
    let pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), pitch_deg.to_radians());
    let roll = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), roll_deg.to_radians());
    yaw * pitch * roll
}

/// Express `rotation` relative to a calibration `origin`.
///
/// Both are camera-to-world rotations in the sensor's reference frame; the
/// result maps camera coordinates into the origin's camera frame. For
/// rotations about a single axis this equals `rotation · origin⁻¹`.
#[inline]
pub fn relative_to_origin(
    rotation: &UnitQuaternion<f64>,
    origin: &UnitQuaternion<f64>,
) -> UnitQuaternion<f64> {
    origin.inverse() * rotation
}
