//! Calibration workflow: obtain sensor permission, then capture the current
//! device orientation as the world origin.
//!
//! ```text
//! Idle ──start(granted)──▶ AwaitingCapture ──complete──▶ Calibrated
//!   │ └─start(denied)──▶ Denied
//!   └──────cancel──────▶ Cancelled   (permanent for the session)
//! ```

use std::sync::Arc;

use anyhow::{bail, Result};
use nalgebra::UnitQuaternion;
use serde::Serialize;
use tracing::{info, warn};

use crate::orientation::{OrientationSensor, OrientationSink, OrientationTracker, PermissionStatus};
use crate::system::shared_state::SharedInputs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CalibrationPhase {
    #[default]
    Idle,
    AwaitingCapture,
    Calibrated,
    Denied,
    Cancelled,
}

/// Whether an origin has been captured, and which one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CalibrationState {
    pub is_calibrated: bool,
    pub origin_rotation: Option<UnitQuaternion<f64>>,
}

#[derive(Default)]
pub struct CalibrationWorkflow {
    phase: CalibrationPhase,
    permission: Option<PermissionStatus>,
    state: CalibrationState,
}

impl CalibrationWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn is_calibrated(&self) -> bool {
        self.state.is_calibrated
    }

    pub fn permission(&self) -> Option<PermissionStatus> {
        self.permission
    }

    /// Request sensor permission and register the orientation listener.
    ///
    /// Permission is requested at most once; later calls return the cached
    /// outcome without prompting again. If registering the listener fails the
    /// workflow stays idle and the next call retries the registration.
    pub fn start(
        &mut self,
        sensor: &mut dyn OrientationSensor,
        shared: &Arc<SharedInputs>,
    ) -> Result<PermissionStatus> {
        if self.phase == CalibrationPhase::Cancelled {
            bail!("calibration was cancelled for this session");
        }
        let status = match self.permission {
            Some(status) => status,
            None => {
                let status = sensor.request_permission();
                self.permission = Some(status);
                status
            }
        };
        if !status.is_granted() {
            if self.phase != CalibrationPhase::Denied {
                warn!(?status, "Orientation permission not granted, anchors stay screen-fixed");
                self.phase = CalibrationPhase::Denied;
            }
            return Ok(status);
        }
        if self.phase != CalibrationPhase::Idle {
            return Ok(status);
        }

        // Permission stays cached; a failed registration is retried by the
        // next call without prompting again.
        shared.set_listener_registered(true);
        if let Err(e) = sensor.start(OrientationSink::new(Arc::clone(shared))) {
            shared.set_listener_registered(false);
            return Err(e.context("failed to register orientation listener"));
        }

        info!("Orientation listener registered, waiting for capture");
        self.phase = CalibrationPhase::AwaitingCapture;
        Ok(status)
    }

    /// Capture the tracker's current raw orientation as the origin.
    ///
    /// Calling again after calibration re-captures the origin.
    pub fn complete(&mut self, tracker: &mut OrientationTracker) -> Result<UnitQuaternion<f64>> {
        match self.phase {
            CalibrationPhase::AwaitingCapture | CalibrationPhase::Calibrated => {}
            CalibrationPhase::Idle => bail!("calibration not started"),
            CalibrationPhase::Denied => bail!("orientation permission was not granted"),
            CalibrationPhase::Cancelled => bail!("calibration was cancelled for this session"),
        }
        if !tracker.is_sensor_active() {
            bail!("no orientation reading received yet");
        }

        let origin = tracker.raw_rotation();
        tracker.set_origin(origin);
        self.state = CalibrationState {
            is_calibrated: true,
            origin_rotation: Some(origin),
        };
        self.phase = CalibrationPhase::Calibrated;

        info!(
            angle_deg = origin.angle().to_degrees(),
            "Calibration origin captured"
        );
        Ok(origin)
    }

    /// Abandon calibration for the rest of the session.
    ///
    /// Has no effect once calibrated. Returns whether the workflow was
    /// cancelled by this call.
    pub fn cancel(&mut self) -> bool {
        match self.phase {
            CalibrationPhase::Calibrated | CalibrationPhase::Cancelled => false,
            _ => {
                info!("Calibration cancelled");
                self.phase = CalibrationPhase::Cancelled;
                true
            }
        }
    }
}
