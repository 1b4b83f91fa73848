//! Frame Coordinator - per-tick driver of the overlay pipeline.
//!
//! The coordinator owns every piece of tracking state. Each call to
//! [`FrameCoordinator::tick`] runs, in order:
//! 1. orientation refresh and, once calibrated with an active sensor, visual
//!    motion estimation and the camera pose update;
//! 2. screen positions for every open window;
//! 3. hand-landmark detection and the gesture state machine;
//! 4. publication of a [`TickResult`].
//!
//! Ticks may arrive at any interval; nothing assumes a fixed Δt.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::anchors::{rotation_compensated_hint, AnchorId, AnchorRegistry};
use crate::calibration::CalibrationWorkflow;
use crate::config::OverlayConfig;
use crate::geometry::{Extent, ViewProjection};
use crate::gesture::{GestureController, GestureInput, HandLandmarks, HitTester, PointerState};
use crate::orientation::{OrientationSensor, OrientationSink, OrientationTracker, PermissionStatus};
use crate::system::shared_state::{LatestCell, SharedInputs};
use crate::vision::{FrameSource, VisualMotionEstimator};

use super::detector::LandmarkProvider;
use super::result::{MotionSummary, TickResult, TickTiming};

/// Where a newly opened window's anchor goes, in screen pixels and meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPlacement {
    pub x: f64,
    pub y: f64,
    pub depth_m: f64,
}

pub struct FrameCoordinator {
    config: OverlayConfig,
    shared: Arc<SharedInputs>,
    tracker: OrientationTracker,
    calibration: CalibrationWorkflow,
    registry: AnchorRegistry,
    motion: VisualMotionEstimator,
    /// Focal length at the motion estimator's working resolution. The camera
    /// is assumed to share the overlay's field of view.
    motion_focal_px: f64,
    gesture: GestureController,

    sensor: Box<dyn OrientationSensor>,
    frames: Box<dyn FrameSource>,
    landmarks: Box<dyn LandmarkProvider>,

    open_windows: BTreeSet<AnchorId>,
    /// Last detection result, reused while the detector has nothing new.
    last_hands: Vec<HandLandmarks>,
    /// Size of the most recent camera frame.
    video_extent: Option<Extent>,

    tick: u64,
    last_tick_ms: Option<f64>,
    stopped: bool,
}

impl FrameCoordinator {
    pub fn new(
        config: OverlayConfig,
        viewport: Extent,
        sensor: Box<dyn OrientationSensor>,
        frames: Box<dyn FrameSource>,
        landmarks: Box<dyn LandmarkProvider>,
    ) -> Self {
        let registry = AnchorRegistry::new(viewport, config.projection.clone(), config.pose.clone());
        let work_extent = Extent::new(config.motion.work_width as f64, config.motion.work_height as f64);
        let motion_focal_px = ViewProjection::new(work_extent, &config.projection).focal_px();
        info!(
            width = viewport.width,
            height = viewport.height,
            "Frame coordinator created"
        );
        Self {
            shared: SharedInputs::new(),
            tracker: OrientationTracker::new(),
            calibration: CalibrationWorkflow::new(),
            registry,
            motion: VisualMotionEstimator::new(config.motion.clone()),
            motion_focal_px,
            gesture: GestureController::new(config.gesture.clone()),
            config,
            sensor,
            frames,
            landmarks,
            open_windows: BTreeSet::new(),
            last_hands: Vec::new(),
            video_extent: None,
            tick: 0,
            last_tick_ms: None,
            stopped: false,
        }
    }

    /// Run one tick. Returns None once stopped.
    pub fn tick(&mut self, now_ms: f64, hit_tester: &dyn HitTester) -> Option<TickResult> {
        if self.stopped {
            return None;
        }
        let start = Instant::now();
        self.tick += 1;
        let since_last_ms = self.last_tick_ms.map(|t| now_ms - t);
        self.last_tick_ms = Some(now_ms);

        // 1. Pose
        self.tracker.refresh(&self.shared);
        let sensor_active = self.tracker.is_sensor_active();
        let frame = self.frames.latest_frame();
        if let Some(frame) = &frame {
            self.video_extent = Some(frame.extent());
        }

        let mut motion = None;
        if self.calibration.is_calibrated() && sensor_active {
            let rotation = self.tracker.current_rotation();
            let previous = self.registry.camera_pose().rotation;
            let estimate = frame.as_ref().map(|f| self.motion.process_frame(f));
            let residual = estimate.as_ref().map(|e| {
                rotation_compensated_hint(
                    e.motion_hint,
                    &previous,
                    &rotation,
                    self.motion_focal_px,
                    self.config.pose.rotation_flow_tolerance_px,
                )
            });
            self.registry.update_camera_pose(rotation, residual);
            motion = estimate.zip(residual).map(|(e, r)| MotionSummary {
                features: e.points.len(),
                matches: e.matches,
                hint_x: e.motion_hint.x,
                hint_y: e.motion_hint.y,
                residual_x: r.x,
                residual_y: r.y,
            });
        }
        let pose_ms = start.elapsed().as_secs_f64() * 1000.0;

        // 2. Anchors
        let anchors = self.registry.screen_positions(&self.open_windows);

        // 3. Gesture
        let gesture_start = Instant::now();
        if let Some(frame) = &frame {
            self.landmarks.submit(frame);
        }
        if let Some(hands) = self.landmarks.poll() {
            self.last_hands = hands;
        }
        let viewport = self.registry.viewport();
        let input = GestureInput {
            hand: self.last_hands.first(),
            pointer: self.shared.pointer.latest(),
            video: self.video_extent.unwrap_or(viewport),
            screen: viewport,
        };
        let update = self.gesture.update(&input, hit_tester, &mut self.registry);
        let gesture_ms = gesture_start.elapsed().as_secs_f64() * 1000.0;

        // 4. Publish
        let timing = TickTiming {
            since_last_ms,
            total_ms: start.elapsed().as_secs_f64() * 1000.0,
            pose_ms,
            gesture_ms,
        };
        debug!(
            tick = self.tick,
            anchors = anchors.len(),
            phase = %update.state.phase,
            hand = update.state.hand_detected,
            total_ms = timing.total_ms,
            "Tick"
        );

        Some(TickResult {
            tick: self.tick,
            timestamp_ms: now_ms,
            anchors,
            gesture: update.state,
            clicks: update.click.into_iter().collect(),
            pose: *self.registry.camera_pose(),
            calibrated: self.calibration.is_calibrated(),
            calibration: self.calibration.phase(),
            sensor_active,
            motion,
            timing,
        })
    }

    /// Open a window, creating its anchor if it has none yet.
    ///
    /// Without a placement the anchor goes to the screen center at the panel
    /// reference depth.
    pub fn open_window(
        &mut self,
        id: impl Into<AnchorId>,
        label: Option<&str>,
        placement: Option<WindowPlacement>,
    ) -> Result<()> {
        let id = id.into();
        if !self.registry.contains(&id) {
            let placement = placement.unwrap_or_else(|| {
                let (x, y) = self.registry.viewport().center();
                WindowPlacement {
                    x,
                    y,
                    depth_m: self.config.panels.reference_depth_m,
                }
            });
            self.registry
                .create_anchor(id.clone(), placement.x, placement.y, placement.depth_m, label)?;
        }
        info!(window = %id, "Window opened");
        self.open_windows.insert(id);
        Ok(())
    }

    /// Close a window and drop its anchor. Returns false if it was not open.
    pub fn close_window(&mut self, id: &AnchorId) -> bool {
        let was_open = self.open_windows.remove(id);
        self.registry.remove_anchor(id);
        if was_open {
            info!(window = %id, "Window closed");
        }
        was_open
    }

    pub fn open_windows(&self) -> impl Iterator<Item = &AnchorId> {
        self.open_windows.iter()
    }

    /// Ask for sensor permission and start listening for orientation.
    pub fn start_calibration(&mut self) -> Result<PermissionStatus> {
        self.calibration.start(self.sensor.as_mut(), &self.shared)
    }

    /// Capture the current orientation as the world origin.
    pub fn complete_calibration(&mut self) -> Result<()> {
        // Capture the freshest reading, not the one from the last tick.
        self.tracker.refresh(&self.shared);
        self.calibration.complete(&mut self.tracker)?;
        self.registry.set_origin();
        self.motion.reset();
        Ok(())
    }

    /// Give up on calibration for this session. The orientation listener is
    /// removed and anchors stay screen-fixed.
    pub fn cancel_calibration(&mut self) -> bool {
        if !self.calibration.cancel() {
            return false;
        }
        self.shared.set_listener_registered(false);
        self.sensor.stop();
        true
    }

    pub fn set_viewport(&mut self, width: f64, height: f64) {
        let viewport = Extent::new(width, height);
        if !viewport.is_valid() {
            warn!(width, height, "Ignoring invalid viewport size");
            return;
        }
        self.registry.set_viewport(viewport);
    }

    /// Write handle for pointer events.
    pub fn pointer_sink(&self) -> LatestCell<PointerState> {
        self.shared.pointer.clone()
    }

    /// Write handle for orientation readings delivered outside the
    /// configured sensor. Readings are dropped until calibration has started
    /// the listener.
    pub fn orientation_sink(&self) -> OrientationSink {
        OrientationSink::new(Arc::clone(&self.shared))
    }

    pub fn registry(&self) -> &AnchorRegistry {
        &self.registry
    }

    pub fn calibration(&self) -> &CalibrationWorkflow {
        &self.calibration
    }

    pub fn tracker(&self) -> &OrientationTracker {
        &self.tracker
    }

    pub fn is_running(&self) -> bool {
        !self.stopped
    }

    /// Unregister the orientation listener, stop the detector and stop
    /// ticking. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.shared.set_listener_registered(false);
        self.sensor.stop();
        self.landmarks.shutdown();
        info!(ticks = self.tick, "Frame coordinator stopped");
    }
}

impl Drop for FrameCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::{GesturePhase, NoHitTargets};
    use crate::orientation::{ManualOrientationSensor, OrientationSample};
    use crate::system::detector::{DetectorFactory, DetectorWorker, HandLandmarkDetector, InlineLandmarks};
    use crate::vision::VideoFrame;
    use approx::assert_relative_eq;
    use image::{imageops, GrayImage, Luma};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::time::Duration;

    /// Returns whatever hands the test put in the slot.
    struct SlotDetector(LatestCell<Vec<HandLandmarks>>);

    impl HandLandmarkDetector for SlotDetector {
        fn detect(&mut self, _frame: &VideoFrame, _timestamp_ms: f64) -> Result<Vec<HandLandmarks>> {
            Ok(self.0.latest().unwrap_or_default())
        }
    }

    struct Rig {
        coordinator: FrameCoordinator,
        frames: LatestCell<VideoFrame>,
        hands: LatestCell<Vec<HandLandmarks>>,
    }

    fn rig(permission: PermissionStatus) -> Rig {
        let frames: LatestCell<VideoFrame> = LatestCell::new();
        let hands = LatestCell::new();
        let slot = hands.clone();
        let factory: DetectorFactory =
            Box::new(move || -> Result<Box<dyn HandLandmarkDetector>> { Ok(Box::new(SlotDetector(slot))) });
        let coordinator = FrameCoordinator::new(
            OverlayConfig::default(),
            Extent::new(800.0, 600.0),
            Box::new(ManualOrientationSensor::new(permission)),
            Box::new(frames.clone()),
            Box::new(InlineLandmarks::new(factory)),
        );
        Rig {
            coordinator,
            frames,
            hands,
        }
    }

    #[test]
    fn test_open_window_creates_anchor_once() {
        let mut rig = rig(PermissionStatus::Granted);
        let c = &mut rig.coordinator;
        c.open_window("note1", Some("Note"), None).unwrap();
        let result = c.tick(0.0, &NoHitTargets).unwrap();
        let pos = result.anchors[&AnchorId::from("note1")];
        assert_relative_eq!(pos.x, 400.0, epsilon = 1e-9);
        assert_relative_eq!(pos.y, 300.0, epsilon = 1e-9);

        // Re-opening does not move the existing anchor.
        c.open_window(
            "note1",
            None,
            Some(WindowPlacement {
                x: 10.0,
                y: 10.0,
                depth_m: 1.0,
            }),
        )
        .unwrap();
        let result = c.tick(16.0, &NoHitTargets).unwrap();
        assert_relative_eq!(result.anchors[&AnchorId::from("note1")].x, 400.0, epsilon = 1e-9);
        assert_eq!(result.timing.since_last_ms, Some(16.0));
    }

    #[test]
    fn test_closed_window_is_not_published() {
        let mut rig = rig(PermissionStatus::Granted);
        let c = &mut rig.coordinator;
        c.open_window("a", None, None).unwrap();
        c.open_window("b", None, None).unwrap();
        assert!(c.close_window(&"a".into()));
        assert!(!c.close_window(&"a".into()));
        let result = c.tick(0.0, &NoHitTargets).unwrap();
        assert_eq!(result.anchors.len(), 1);
        assert!(!c.registry().contains(&"a".into()));
    }

    #[test]
    fn test_pose_untouched_until_calibrated() {
        let mut rig = rig(PermissionStatus::Granted);
        let c = &mut rig.coordinator;
        c.open_window("note1", None, None).unwrap();
        c.start_calibration().unwrap();
        c.orientation_sink().push(OrientationSample::new(40.0, 0.0, 0.0, 1.0));

        let result = c.tick(0.0, &NoHitTargets).unwrap();
        assert!(result.sensor_active);
        assert!(!result.calibrated);
        assert_relative_eq!(result.anchors[&AnchorId::from("note1")].x, 400.0, epsilon = 1e-9);
    }

    #[test]
    fn test_denied_permission_keeps_anchors_screen_fixed() {
        let mut rig = rig(PermissionStatus::Denied);
        let c = &mut rig.coordinator;
        c.open_window("note1", None, None).unwrap();
        assert_eq!(c.start_calibration().unwrap(), PermissionStatus::Denied);
        c.orientation_sink().push(OrientationSample::new(90.0, 0.0, 0.0, 1.0));
        assert!(c.complete_calibration().is_err());

        let result = c.tick(0.0, &NoHitTargets).unwrap();
        assert!(!result.sensor_active);
        assert_relative_eq!(result.anchors[&AnchorId::from("note1")].x, 400.0, epsilon = 1e-9);
    }

    #[test]
    fn test_calibrated_rotation_moves_anchor() {
        let mut rig = rig(PermissionStatus::Granted);
        let sink = rig.coordinator.orientation_sink();
        let c = &mut rig.coordinator;
        c.open_window("note1", None, None).unwrap();
        c.start_calibration().unwrap();
        sink.push(OrientationSample::new(10.0, 0.0, 0.0, 1.0));
        c.complete_calibration().unwrap();

        sink.push(OrientationSample::new(30.0, 0.0, 0.0, 2.0));
        let turned = c.tick(16.0, &NoHitTargets).unwrap();
        assert!(turned.calibrated);
        assert!(turned.anchors[&AnchorId::from("note1")].x < 400.0);
        // No frames: no motion estimate.
        assert!(turned.motion.is_none());

        sink.push(OrientationSample::new(10.0, 0.0, 0.0, 3.0));
        let back = c.tick(32.0, &NoHitTargets).unwrap();
        assert_relative_eq!(back.anchors[&AnchorId::from("note1")].x, 400.0, epsilon = 1e-9);
    }

    #[test]
    fn test_frames_feed_motion_after_calibration() {
        let mut rig = rig(PermissionStatus::Granted);
        let sink = rig.coordinator.orientation_sink();
        rig.coordinator.start_calibration().unwrap();
        sink.push(OrientationSample::new(0.0, 0.0, 0.0, 1.0));
        rig.coordinator.complete_calibration().unwrap();

        rig.frames.publish(VideoFrame::blank(640, 480, 0.0));
        let result = rig.coordinator.tick(0.0, &NoHitTargets).unwrap();
        let motion = result.motion.unwrap();
        assert_eq!(motion.matches, 0);
        assert_eq!(motion.hint_x, 0.0);
    }

    #[test]
    fn test_cancel_calibration_stops_listening() {
        let mut rig = rig(PermissionStatus::Granted);
        let c = &mut rig.coordinator;
        c.start_calibration().unwrap();
        assert!(c.cancel_calibration());
        c.orientation_sink().push(OrientationSample::new(20.0, 0.0, 0.0, 1.0));
        let result = c.tick(0.0, &NoHitTargets).unwrap();
        assert!(!result.sensor_active);
        assert!(c.start_calibration().is_err());
    }

    #[test]
    fn test_hand_result_is_reused_between_detections() {
        let mut rig = rig(PermissionStatus::Granted);
        rig.hands.publish(vec![HandLandmarks::from_tips(
            nalgebra::Point2::new(0.5, 0.5),
            nalgebra::Point2::new(0.51, 0.5),
        )]);
        rig.frames.publish(VideoFrame::blank(640, 480, 0.0));

        let first = rig.coordinator.tick(0.0, &NoHitTargets).unwrap();
        assert!(first.gesture.hand_detected);
        assert_eq!(first.gesture.phase, GesturePhase::PinchDown);

        // No new frame: the previous detection still drives the gesture.
        let second = rig.coordinator.tick(16.0, &NoHitTargets).unwrap();
        assert!(second.gesture.hand_detected);
        assert_eq!(second.gesture.phase, GesturePhase::Dragging);
    }

    #[test]
    fn test_pointer_fallback() {
        let mut rig = rig(PermissionStatus::Granted);
        let pointer = rig.coordinator.pointer_sink();
        pointer.publish(PointerState::new(100.0, 100.0, true));
        let result = rig.coordinator.tick(0.0, &NoHitTargets).unwrap();
        assert!(!result.gesture.hand_detected);
        assert!(result.gesture.pinching);
        assert_eq!(result.gesture.phase, GesturePhase::PinchDown);
    }

    #[test]
    fn test_stop_is_idempotent_and_final() {
        let mut rig = rig(PermissionStatus::Granted);
        let c = &mut rig.coordinator;
        c.start_calibration().unwrap();
        c.stop();
        c.stop();
        assert!(!c.is_running());
        assert!(c.tick(0.0, &NoHitTargets).is_none());
        c.orientation_sink().push(OrientationSample::new(20.0, 0.0, 0.0, 1.0));
        assert!(!c.tracker().is_sensor_active());
    }

    #[test]
    fn test_invalid_viewport_is_ignored() {
        let mut rig = rig(PermissionStatus::Granted);
        rig.coordinator.set_viewport(0.0, 600.0);
        assert_eq!(rig.coordinator.registry().viewport(), Extent::new(800.0, 600.0));
        rig.coordinator.set_viewport(1024.0, 768.0);
        assert_eq!(rig.coordinator.registry().viewport(), Extent::new(1024.0, 768.0));
    }

    fn noise_texture(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        GrayImage::from_fn(width, height, |_, _| Luma([rng.gen::<u8>()]))
    }

    #[test]
    fn test_head_turn_with_frames_keeps_world_lock() {
        let mut rig = rig(PermissionStatus::Granted);
        let sink = rig.coordinator.orientation_sink();
        rig.coordinator.start_calibration().unwrap();
        sink.push(OrientationSample::new(0.0, 0.0, 0.0, 0.0));
        rig.coordinator.complete_calibration().unwrap();
        rig.coordinator
            .open_window(
                "note1",
                None,
                Some(WindowPlacement {
                    x: 400.0,
                    y: 300.0,
                    depth_m: 2.0,
                }),
            )
            .unwrap();

        // Working-resolution frames of a distant scene: turning right by
        // `yaw` slides the content left by focal * tan(yaw).
        let texture = noise_texture(480, 260, 42);
        let focal = 320.0;
        let frame_at = |yaw_deg: f64, ts: f64| {
            let shift = (focal * yaw_deg.to_radians().tan()).round() as u32;
            VideoFrame::new(imageops::crop_imm(&texture, 10 + shift, 10, 320, 240).to_image(), ts)
        };
        rig.frames.publish(frame_at(0.0, 0.0));
        rig.coordinator.tick(0.0, &NoHitTargets).unwrap();

        let mut last = None;
        for i in 1..=12 {
            let yaw = i as f64;
            let t = 16.0 * i as f64;
            sink.push(OrientationSample::new(yaw, 0.0, 0.0, t));
            rig.frames.publish(frame_at(yaw, t));
            last = rig.coordinator.tick(t, &NoHitTargets);
        }

        let result = last.unwrap();
        let motion = result.motion.unwrap();
        assert!(motion.hint_x <= -5.0, "image should move left, got {}", motion.hint_x);
        assert_eq!(motion.residual_x, 0.0);
        assert!(result.pose.position_offset.norm() < 1e-12);
        let pos = result.anchors[&AnchorId::from("note1")];
        assert_relative_eq!(pos.x, 400.0 - 800.0 * 12f64.to_radians().tan(), epsilon = 1e-6);
        assert_relative_eq!(pos.y, 300.0, epsilon = 1e-6);
    }

    #[test]
    fn test_background_detector_drives_gesture() {
        let frames: LatestCell<VideoFrame> = LatestCell::new();
        let hands: LatestCell<Vec<HandLandmarks>> = LatestCell::new();
        let slot = hands.clone();
        let factory: DetectorFactory =
            Box::new(move || -> Result<Box<dyn HandLandmarkDetector>> { Ok(Box::new(SlotDetector(slot))) });
        let mut c = FrameCoordinator::new(
            OverlayConfig::default(),
            Extent::new(800.0, 600.0),
            Box::new(ManualOrientationSensor::new(PermissionStatus::Granted)),
            Box::new(frames.clone()),
            Box::new(DetectorWorker::spawn(factory)),
        );
        hands.publish(vec![HandLandmarks::from_tips(
            nalgebra::Point2::new(0.5, 0.5),
            nalgebra::Point2::new(0.7, 0.5),
        )]);

        let mut detected = None;
        for i in 0..500 {
            frames.publish(VideoFrame::blank(64, 48, i as f64));
            let result = c.tick(i as f64 * 10.0, &NoHitTargets).unwrap();
            if result.gesture.hand_detected {
                detected = Some(result);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let result = detected.expect("worker never reported the hand");
        assert!(!result.gesture.pinching);
        let cursor = result.gesture.cursor.unwrap();
        assert_relative_eq!(cursor.x, 400.0, epsilon = 1e-9);

        c.stop();
        assert!(!c.is_running());
    }
}
