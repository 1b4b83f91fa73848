//! Registry of world-anchored objects.
//!
//! The registry owns every anchor and the camera pose used for the current
//! tick. Placement requests arrive in screen space and are un-projected into
//! the world; the per-tick query projects them back.
//!
//! Anchors created before calibration are expressed relative to the identity
//! origin and are not re-expressed once calibration completes, so their
//! screen positions may jump at that moment.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use nalgebra::{UnitQuaternion, Vector2};
use tracing::debug;

use crate::config::{PoseConfig, ProjectionConfig};
use crate::geometry::{Extent, ScreenPosition, ViewProjection};

use super::anchor::Anchor;
use super::pose::{update_camera_pose, CameraPose};
use super::types::AnchorId;

pub struct AnchorRegistry {
    anchors: HashMap<AnchorId, Anchor>,
    pose: CameraPose,
    projection: ViewProjection,
    projection_config: ProjectionConfig,
    pose_config: PoseConfig,
}

impl AnchorRegistry {
    pub fn new(viewport: Extent, projection_config: ProjectionConfig, pose_config: PoseConfig) -> Self {
        Self {
            anchors: HashMap::new(),
            pose: CameraPose::identity(),
            projection: ViewProjection::new(viewport, &projection_config),
            projection_config,
            pose_config,
        }
    }

    /// Resize the viewport. World positions are unchanged.
    pub fn set_viewport(&mut self, viewport: Extent) {
        self.projection = ViewProjection::new(viewport, &self.projection_config);
    }

    pub fn viewport(&self) -> Extent {
        self.projection.viewport()
    }

    pub fn projection(&self) -> &ViewProjection {
        &self.projection
    }

    pub fn camera_pose(&self) -> &CameraPose {
        &self.pose
    }

    /// Place (or re-place) an anchor under a screen position at `depth_m`.
    ///
    /// Re-creating an existing id overwrites its world position; the label is
    /// replaced only when a new one is given.
    pub fn create_anchor(
        &mut self,
        id: impl Into<AnchorId>,
        screen_x: f64,
        screen_y: f64,
        depth_m: f64,
        label: Option<&str>,
    ) -> Result<&Anchor> {
        let id = id.into();
        if !(screen_x.is_finite() && screen_y.is_finite()) {
            bail!("anchor {} placed at non-finite screen position", id);
        }
        if !depth_m.is_finite() || depth_m <= 0.0 {
            bail!("anchor {} placed at invalid depth {}", id, depth_m);
        }

        let p_cam = self.projection.unproject(screen_x, screen_y, depth_m);
        let world_position = self.pose.camera_to_world(&p_cam);

        let anchor = self
            .anchors
            .entry(id.clone())
            .and_modify(|a| a.relocate(world_position))
            .or_insert_with(|| Anchor::new(id.clone(), world_position));
        if let Some(label) = label {
            anchor.label = Some(label.to_string());
        }

        debug!(
            anchor = %anchor.id,
            revision = anchor.revision,
            x = world_position.x,
            y = world_position.y,
            z = world_position.z,
            "Anchor placed"
        );
        Ok(anchor)
    }

    /// Screen position of one anchor under the current pose, or None for an
    /// unknown id.
    pub fn anchor_screen_position(&self, id: &AnchorId) -> Option<ScreenPosition> {
        let anchor = self.anchors.get(id)?;
        let relative = self.pose.world_to_camera(&anchor.world_position);
        Some(self.projection.project(&relative))
    }

    /// Screen positions for a set of ids; unknown ids are left out.
    pub fn screen_positions<'a, I>(&self, ids: I) -> BTreeMap<AnchorId, ScreenPosition>
    where
        I: IntoIterator<Item = &'a AnchorId>,
    {
        ids.into_iter()
            .filter_map(|id| self.anchor_screen_position(id).map(|pos| (id.clone(), pos)))
            .collect()
    }

    pub fn all_screen_positions(&self) -> BTreeMap<AnchorId, ScreenPosition> {
        self.screen_positions(self.anchors.keys())
    }

    /// Fuse the tracker rotation and an optional visual hint into the pose
    /// used by every query until the next update.
    pub fn update_camera_pose(&mut self, rotation: UnitQuaternion<f64>, visual_hint: Option<Vector2<f32>>) {
        self.pose = update_camera_pose(&self.pose, rotation, visual_hint, &self.pose_config);
    }

    /// Calibration: the current camera orientation becomes the world origin.
    pub fn set_origin(&mut self) {
        self.pose = CameraPose::identity();
    }

    pub fn set_world_rotation(&mut self, id: &AnchorId, rotation: Option<UnitQuaternion<f64>>) -> bool {
        match self.anchors.get_mut(id) {
            Some(anchor) => {
                anchor.world_rotation = rotation;
                true
            }
            None => false,
        }
    }

    pub fn remove_anchor(&mut self, id: &AnchorId) -> Option<Anchor> {
        let removed = self.anchors.remove(id);
        if removed.is_some() {
            debug!(anchor = %id, "Anchor removed");
        }
        removed
    }

    pub fn get(&self, id: &AnchorId) -> Option<&Anchor> {
        self.anchors.get(id)
    }

    pub fn contains(&self, id: &AnchorId) -> bool {
        self.anchors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &AnchorId> {
        self.anchors.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::euler_deg_to_quaternion;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn registry() -> AnchorRegistry {
        AnchorRegistry::new(
            Extent::new(800.0, 600.0),
            ProjectionConfig::default(),
            PoseConfig::default(),
        )
    }

    #[test]
    fn test_create_then_query_round_trip() {
        let mut reg = registry();
        reg.create_anchor("a", 123.0, 456.0, 1.5, None).unwrap();
        let pos = reg.anchor_screen_position(&"a".into()).unwrap();
        assert_relative_eq!(pos.x, 123.0, epsilon = 1e-9);
        assert_relative_eq!(pos.y, 456.0, epsilon = 1e-9);
        assert_relative_eq!(pos.depth, 1.5, epsilon = 1e-12);
        assert!(pos.visible);
    }

    #[test]
    fn test_round_trip_under_rotated_pose() {
        let mut reg = registry();
        reg.update_camera_pose(euler_deg_to_quaternion(33.0, -10.0, 4.0), Some(Vector2::new(2.0, 1.0)));
        reg.create_anchor("a", 610.0, 95.0, 3.0, Some("panel")).unwrap();
        let pos = reg.anchor_screen_position(&"a".into()).unwrap();
        assert_relative_eq!(pos.x, 610.0, epsilon = 1e-9);
        assert_relative_eq!(pos.y, 95.0, epsilon = 1e-9);
        assert_relative_eq!(pos.depth, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unknown_id_is_none() {
        let reg = registry();
        assert!(reg.anchor_screen_position(&"missing".into()).is_none());
    }

    #[test]
    fn test_recreate_overwrites_position_and_keeps_label() {
        let mut reg = registry();
        reg.create_anchor("a", 400.0, 300.0, 2.0, Some("Chat")).unwrap();
        reg.create_anchor("a", 500.0, 300.0, 2.0, None).unwrap();
        assert_eq!(reg.len(), 1);
        let anchor = reg.get(&"a".into()).unwrap();
        assert_eq!(anchor.label.as_deref(), Some("Chat"));
        assert_eq!(anchor.revision, 1);
        assert_relative_eq!(anchor.world_position.x, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_depth_rejected() {
        let mut reg = registry();
        assert!(reg.create_anchor("a", 0.0, 0.0, 0.0, None).is_err());
        assert!(reg.create_anchor("a", 0.0, 0.0, f64::NAN, None).is_err());
        assert!(reg.create_anchor("a", f64::INFINITY, 0.0, 1.0, None).is_err());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_visibility_at_near_clip() {
        let mut reg = registry();
        reg.create_anchor("at", 400.0, 300.0, 0.2, None).unwrap();
        reg.create_anchor("past", 400.0, 300.0, 0.2 + 1e-9, None).unwrap();
        assert!(!reg.anchor_screen_position(&"at".into()).unwrap().visible);
        assert!(reg.anchor_screen_position(&"past".into()).unwrap().visible);
    }

    #[test]
    fn test_world_lock_under_yaw() {
        let mut reg = registry();
        reg.create_anchor("a", 400.0, 300.0, 2.0, None).unwrap();

        reg.update_camera_pose(euler_deg_to_quaternion(30.0, 0.0, 0.0), None);
        let pos = reg.anchor_screen_position(&"a".into()).unwrap();
        assert!(pos.visible);
        assert!(pos.x < 400.0, "turning right moves the anchor left, got {}", pos.x);
        assert_relative_eq!(pos.y, 300.0, epsilon = 1e-9);

        reg.update_camera_pose(euler_deg_to_quaternion(0.0, 0.0, 0.0), None);
        let back = reg.anchor_screen_position(&"a".into()).unwrap();
        assert_relative_eq!(back.x, 400.0, epsilon = 1e-9);
    }

    #[test]
    fn test_set_origin_resets_pose() {
        let mut reg = registry();
        reg.update_camera_pose(euler_deg_to_quaternion(50.0, 0.0, 0.0), Some(Vector2::new(3.0, 0.0)));
        reg.set_origin();
        assert_eq!(*reg.camera_pose(), CameraPose::identity());
    }

    #[test]
    fn test_viewport_resize_keeps_world_position() {
        let mut reg = registry();
        reg.create_anchor("a", 400.0, 300.0, 2.0, None).unwrap();
        reg.set_viewport(Extent::new(1000.0, 500.0));
        let pos = reg.anchor_screen_position(&"a".into()).unwrap();
        assert_relative_eq!(pos.x, 500.0, epsilon = 1e-9);
        assert_relative_eq!(pos.y, 250.0, epsilon = 1e-9);
        assert_eq!(reg.get(&"a".into()).unwrap().world_position, Vector3::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn test_screen_positions_skip_unknown_and_remove() {
        let mut reg = registry();
        reg.create_anchor("a", 100.0, 100.0, 2.0, None).unwrap();
        reg.create_anchor("b", 200.0, 100.0, 2.0, None).unwrap();
        let ids = vec![AnchorId::from("a"), AnchorId::from("ghost")];
        let map = reg.screen_positions(&ids);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&AnchorId::from("a")));

        assert!(reg.remove_anchor(&"b".into()).is_some());
        assert!(reg.remove_anchor(&"b".into()).is_none());
        assert_eq!(reg.all_screen_positions().len(), 1);
    }

    #[test]
    fn test_set_world_rotation() {
        let mut reg = registry();
        reg.create_anchor("a", 400.0, 300.0, 2.0, None).unwrap();
        let q = euler_deg_to_quaternion(10.0, 0.0, 0.0);
        assert!(reg.set_world_rotation(&"a".into(), Some(q)));
        assert_eq!(reg.get(&"a".into()).unwrap().world_rotation, Some(q));
        assert!(!reg.set_world_rotation(&"nope".into(), None));
    }
}
