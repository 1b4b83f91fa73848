//! State shared between push-based input callbacks and the tick loop.
//!
//! Sensor callbacks (device orientation, pointer events) may fire at any time
//! between ticks. They only ever replace the value held in a single-slot
//! [`LatestCell`]; the Frame Coordinator reads each cell once at the start of
//! a tick, so values are frozen for the duration of that tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::gesture::PointerState;
use crate::orientation::OrientationSample;

/// Single-slot, last-write-wins cell.
///
/// Cloning yields another handle to the same slot.
pub struct LatestCell<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for LatestCell<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone> LatestCell<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace the stored value.
    pub fn publish(&self, value: T) {
        *self.slot.lock() = Some(value);
    }

    /// Copy of the most recent value, if any was ever published.
    pub fn latest(&self) -> Option<T> {
        self.slot.lock().clone()
    }

    /// Remove and return the stored value.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}

impl<T: Clone> Default for LatestCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Inputs written outside the tick and read at tick start.
pub struct SharedInputs {
    /// Latest device orientation reading.
    pub orientation: LatestCell<OrientationSample>,

    /// Latest pointer (mouse) state, used when no hand is detected.
    pub pointer: LatestCell<PointerState>,

    /// True while an orientation listener is registered.
    /// Samples pushed while false are dropped.
    listener_registered: AtomicBool,

    /// True once a sample has arrived since the listener was registered.
    sensor_active: AtomicBool,
}

impl SharedInputs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_listener_registered(&self) -> bool {
        self.listener_registered.load(Ordering::SeqCst)
    }

    pub fn set_listener_registered(&self, value: bool) {
        self.listener_registered.store(value, Ordering::SeqCst);
        if !value {
            self.sensor_active.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_sensor_active(&self) -> bool {
        self.sensor_active.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_sensor_active(&self) {
        self.sensor_active.store(true, Ordering::SeqCst);
    }
}

impl Default for SharedInputs {
    fn default() -> Self {
        Self {
            orientation: LatestCell::new(),
            pointer: LatestCell::new(),
            listener_registered: AtomicBool::new(false),
            sensor_active: AtomicBool::new(false),
        }
    }
}
