//! Orientation tracking: raw yaw/pitch/roll → rotation relative to the
//! calibration origin.
//!
//! No smoothing is applied; the tracker trades sensor jitter for latency. A
//! low-pass or Kalman stage could be inserted in [`OrientationTracker::update`]
//! without changing its signature.

pub mod sensor;

use nalgebra::UnitQuaternion;

use crate::geometry::{euler_deg_to_quaternion, relative_to_origin};
use crate::system::shared_state::SharedInputs;

pub use sensor::{
    ManualOrientationSensor, OrientationSample, OrientationSensor, OrientationSink,
    PermissionStatus,
};

/// Converts orientation readings and holds the latest result.
pub struct OrientationTracker {
    /// Calibration origin (identity until calibrated).
    origin: UnitQuaternion<f64>,
    /// Last reading, not yet relative to the origin.
    raw: UnitQuaternion<f64>,
    /// Last reading relative to the origin.
    current: UnitQuaternion<f64>,
    /// Timestamp of the last applied sample.
    last_sample_ms: Option<f64>,
    sensor_active: bool,
}

impl OrientationTracker {
    pub fn new() -> Self {
        Self {
            origin: UnitQuaternion::identity(),
            raw: UnitQuaternion::identity(),
            current: UnitQuaternion::identity(),
            last_sample_ms: None,
            sensor_active: false,
        }
    }

    /// Convert a reading, express it relative to the origin, store and return it.
    pub fn update(&mut self, yaw_deg: f64, pitch_deg: f64, roll_deg: f64) -> UnitQuaternion<f64> {
        self.raw = euler_deg_to_quaternion(yaw_deg, pitch_deg, roll_deg);
        self.current = relative_to_origin(&self.raw, &self.origin);
        self.current
    }

    pub fn apply_sample(&mut self, sample: &OrientationSample) -> UnitQuaternion<f64> {
        self.last_sample_ms = Some(sample.timestamp_ms);
        self.update(sample.yaw_deg, sample.pitch_deg, sample.roll_deg)
    }

    /// Pull the latest reading from the shared cell.
    ///
    /// Called once at tick start. The cell is drained, so every pushed reading
    /// is applied regardless of its timestamp; between pushes the tracker
    /// holds the last value. Returns true if a new sample was applied.
    pub fn refresh(&mut self, shared: &SharedInputs) -> bool {
        self.sensor_active = shared.is_sensor_active();
        if !self.sensor_active {
            return false;
        }
        match shared.orientation.take() {
            Some(sample) => {
                self.apply_sample(&sample);
                true
            }
            None => false,
        }
    }

    /// Timestamp of the last reading applied through [`refresh`](Self::refresh)
    /// or [`apply_sample`](Self::apply_sample).
    pub fn last_sample_ms(&self) -> Option<f64> {
        self.last_sample_ms
    }

    /// Last computed rotation relative to the origin.
    pub fn current_rotation(&self) -> UnitQuaternion<f64> {
        self.current
    }

    /// Last reading without the calibration origin applied.
    pub fn raw_rotation(&self) -> UnitQuaternion<f64> {
        self.raw
    }

    pub fn origin(&self) -> UnitQuaternion<f64> {
        self.origin
    }

    /// Install a new calibration origin and re-express the current reading.
    pub fn set_origin(&mut self, origin: UnitQuaternion<f64>) {
        self.origin = origin;
        self.current = relative_to_origin(&self.raw, &self.origin);
    }

    /// Whether readings are arriving. Distinct from "orientation unchanged".
    pub fn is_sensor_active(&self) -> bool {
        self.sensor_active
    }
}

impl Default for OrientationTracker {
    fn default() -> Self {
        Self::new()
    }
}
