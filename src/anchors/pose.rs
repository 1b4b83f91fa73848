//! Camera pose and its per-tick update.

use nalgebra::{UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::PoseConfig;

/// Camera pose relative to the calibration origin.
///
/// `rotation` is camera-to-world. `position_offset` is the small camera
/// translation accumulated from visual motion hints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub rotation: UnitQuaternion<f64>,
    pub position_offset: Vector3<f64>,
}

impl CameraPose {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            position_offset: Vector3::zeros(),
        }
    }

    /// Express a world point in the camera frame.
    #[inline]
    pub fn world_to_camera(&self, p_world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse_transform_vector(&(p_world - self.position_offset))
    }

    /// Express a camera-frame point in the world frame.
    #[inline]
    pub fn camera_to_world(&self, p_cam: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p_cam + self.position_offset
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Merge a new orientation and an optional visual hint into the pose.
///
/// A non-zero hint (working-resolution pixels of image motion) moves the
/// camera opposite to the image motion along its own x/y axes. Without a hint
/// the offset shrinks by `hint_decay`. The offset norm never exceeds
/// `max_offset_m`.
pub fn update_camera_pose(
    pose: &CameraPose,
    rotation: UnitQuaternion<f64>,
    hint: Option<Vector2<f32>>,
    config: &PoseConfig,
) -> CameraPose {
    let mut offset = match hint.filter(|h| *h != Vector2::zeros()) {
        Some(h) => {
            let correction_cam = Vector3::new(
                -(h.x as f64) * config.hint_meters_per_px,
                -(h.y as f64) * config.hint_meters_per_px,
                0.0,
            );
            pose.position_offset + rotation * correction_cam
        }
        None => pose.position_offset * config.hint_decay,
    };

    let norm = offset.norm();
    if norm > config.max_offset_m && norm > 0.0 {
        offset *= config.max_offset_m / norm;
    }

    CameraPose {
        rotation,
        position_offset: offset,
    }
}

/// Image motion at the optical center caused by turning the camera from
/// `previous` to `current`, for a pinhole with focal length `focal_px`.
///
/// Both rotations are camera-to-world. The result is in the same pixel units
/// as `focal_px`.
pub fn rotation_flow(
    previous: &UnitQuaternion<f64>,
    current: &UnitQuaternion<f64>,
    focal_px: f64,
) -> Vector2<f64> {
    let delta = current.inverse() * previous;
    let ray = delta * Vector3::z();
    if ray.z <= f64::EPSILON {
        // Turned by 90° or more within one tick; nothing sensible to predict.
        return Vector2::zeros();
    }
    Vector2::new(ray.x / ray.z * focal_px, ray.y / ray.z * focal_px)
}

/// Remove the rotation-induced part of a measured image motion hint.
///
/// The orientation sensor already accounts for rotation, so only the residual
/// can indicate translation. Residuals within `tolerance_px` on both axes are
/// treated as no motion, absorbing integer-pixel matching.
pub fn rotation_compensated_hint(
    hint: Vector2<f32>,
    previous: &UnitQuaternion<f64>,
    current: &UnitQuaternion<f64>,
    focal_px: f64,
    tolerance_px: f64,
) -> Vector2<f32> {
    if hint == Vector2::zeros() {
        return hint;
    }
    let predicted = rotation_flow(previous, current, focal_px);
    let residual = Vector2::new(hint.x as f64 - predicted.x, hint.y as f64 - predicted.y);
    if residual.x.abs() <= tolerance_px && residual.y.abs() <= tolerance_px {
        Vector2::zeros()
    } else {
        residual.cast::<f32>()
    }
}
