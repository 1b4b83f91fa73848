//! Device orientation sensor interface.
//!
//! Platform sensors deliver readings through push callbacks. Implementations
//! of [`OrientationSensor`] forward each reading to the [`OrientationSink`]
//! they were started with; the sink only stores the value; pose math happens
//! inside the tick.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::system::shared_state::SharedInputs;

/// One raw orientation reading in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub timestamp_ms: f64,
}

impl OrientationSample {
    pub fn new(yaw_deg: f64, pitch_deg: f64, roll_deg: f64, timestamp_ms: f64) -> Self {
        Self {
            yaw_deg,
            pitch_deg,
            roll_deg,
            timestamp_ms,
        }
    }
}

/// Outcome of asking the platform for sensor access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// No orientation sensor on this platform.
    Unsupported,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Write handle handed to a sensor's callback.
#[derive(Clone)]
pub struct OrientationSink {
    shared: Arc<SharedInputs>,
}

impl OrientationSink {
    pub(crate) fn new(shared: Arc<SharedInputs>) -> Self {
        Self { shared }
    }

    /// Store a reading. Dropped when no listener is registered.
    pub fn push(&self, sample: OrientationSample) {
        if !self.shared.is_listener_registered() {
            debug!("Dropping orientation sample after listener was removed");
            return;
        }
        self.shared.orientation.publish(sample);
        self.shared.mark_sensor_active();
    }
}

/// A source of device orientation readings.
pub trait OrientationSensor: Send {
    /// Ask for access. Some platforms require an explicit user grant before
    /// any reading is delivered.
    fn request_permission(&mut self) -> PermissionStatus;

    /// Register the listener; readings go to `sink` until [`stop`](Self::stop).
    fn start(&mut self, sink: OrientationSink) -> Result<()>;

    /// Unregister the listener.
    fn stop(&mut self);
}

/// Sensor driven by explicit calls, for replays and tests.
pub struct ManualOrientationSensor {
    permission: PermissionStatus,
    sink: Option<OrientationSink>,
    permission_requests: usize,
}

impl ManualOrientationSensor {
    pub fn new(permission: PermissionStatus) -> Self {
        Self {
            permission,
            sink: None,
            permission_requests: 0,
        }
    }

    /// Deliver a reading as the platform callback would.
    /// Returns false when no listener is registered.
    pub fn emit(&self, sample: OrientationSample) -> bool {
        match &self.sink {
            Some(sink) => {
                sink.push(sample);
                true
            }
            None => false,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.sink.is_some()
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests
    }
}

impl OrientationSensor for ManualOrientationSensor {
    fn request_permission(&mut self) -> PermissionStatus {
        self.permission_requests += 1;
        self.permission
    }

    fn start(&mut self, sink: OrientationSink) -> Result<()> {
        if !self.permission.is_granted() {
            anyhow::bail!("orientation permission not granted ({:?})", self.permission);
        }
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.sink = None;
    }
}
