use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::types::AnchorId;

/// A point fixed in the calibrated world frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: AnchorId,
    /// World position in meters, relative to the calibration origin.
    pub world_position: Vector3<f64>,
    /// Optional orientation of the anchored object. Carried, never used for
    /// projection.
    pub world_rotation: Option<UnitQuaternion<f64>>,
    pub label: Option<String>,
    /// Number of times the anchor was re-placed after creation.
    pub revision: u64,
}

impl Anchor {
    pub fn new(id: AnchorId, world_position: Vector3<f64>) -> Self {
        Self {
            id,
            world_position,
            world_rotation: None,
            label: None,
            revision: 0,
        }
    }

    pub(crate) fn relocate(&mut self, world_position: Vector3<f64>) {
        self.world_position = world_position;
        self.revision += 1;
    }
}
