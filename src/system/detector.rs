//! Hand-landmark detection, inline or on a background thread.
//!
//! The detector is an external model; only its output is consumed. Two
//! providers feed results to the tick:
//! - [`InlineLandmarks`] runs the detector synchronously inside the tick.
//! - [`DetectorWorker`] owns the detector on its own thread. Frames offered
//!   while it is busy are dropped and the tick reuses the last result.
//!
//! A detector that fails to initialize is logged once and hand detection
//! stays off for the session; the pointer fallback keeps the UI usable.

use std::thread::{self, JoinHandle};

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::gesture::HandLandmarks;
use crate::vision::VideoFrame;

/// Frames waiting for the worker. One slot: a busy worker drops new frames.
const FRAME_CHANNEL_CAPACITY: usize = 1;

/// Finished detections not yet polled. Only the newest is kept.
const RESULT_CHANNEL_CAPACITY: usize = 1;

pub trait HandLandmarkDetector: Send {
    /// Detect zero or more hands in `frame`.
    fn detect(&mut self, frame: &VideoFrame, timestamp_ms: f64) -> Result<Vec<HandLandmarks>>;
}

/// Builds a detector. Runs on the thread that will own it.
pub type DetectorFactory = Box<dyn FnOnce() -> Result<Box<dyn HandLandmarkDetector>> + Send>;

pub trait LandmarkProvider {
    /// Offer the latest camera frame for detection.
    fn submit(&mut self, frame: &VideoFrame);

    /// Detection finished since the last poll, if any.
    fn poll(&mut self) -> Option<Vec<HandLandmarks>>;

    /// Release the detector. Further submits are ignored.
    fn shutdown(&mut self) {}
}

fn detect_or_empty(
    detector: &mut dyn HandLandmarkDetector,
    frame: &VideoFrame,
) -> Vec<HandLandmarks> {
    match detector.detect(frame, frame.timestamp_ms()) {
        Ok(hands) => hands,
        Err(e) => {
            warn!("Hand detection failed: {:#}", e);
            Vec::new()
        }
    }
}

/// Runs the detector synchronously inside the tick.
pub struct InlineLandmarks {
    detector: Option<Box<dyn HandLandmarkDetector>>,
    ready: Option<Vec<HandLandmarks>>,
}

impl InlineLandmarks {
    pub fn new(factory: DetectorFactory) -> Self {
        let detector = match factory() {
            Ok(detector) => Some(detector),
            Err(e) => {
                warn!("Hand detector unavailable, using pointer input only: {:#}", e);
                None
            }
        };
        Self {
            detector,
            ready: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.detector.is_some()
    }
}

impl LandmarkProvider for InlineLandmarks {
    fn submit(&mut self, frame: &VideoFrame) {
        if let Some(detector) = self.detector.as_deref_mut() {
            self.ready = Some(detect_or_empty(detector, frame));
        }
    }

    fn poll(&mut self) -> Option<Vec<HandLandmarks>> {
        self.ready.take()
    }

    fn shutdown(&mut self) {
        self.detector = None;
        self.ready = None;
    }
}

/// Owns the detector on a background thread.
pub struct DetectorWorker {
    frame_tx: Option<Sender<VideoFrame>>,
    result_rx: Receiver<Vec<HandLandmarks>>,
    handle: Option<JoinHandle<()>>,
}

impl DetectorWorker {
    pub fn spawn(factory: DetectorFactory) -> Self {
        let (frame_tx, frame_rx) = bounded::<VideoFrame>(FRAME_CHANNEL_CAPACITY);
        let (result_tx, result_rx) = bounded::<Vec<HandLandmarks>>(RESULT_CHANNEL_CAPACITY);
        let stale_rx = result_rx.clone();

        let handle = thread::Builder::new()
            .name("hand-detector".to_string())
            .spawn(move || Self::run(factory, frame_rx, result_tx, stale_rx));
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Could not start hand detector thread: {}", e);
                None
            }
        };

        Self {
            frame_tx: handle.as_ref().map(|_| frame_tx),
            result_rx,
            handle,
        }
    }

    fn run(
        factory: DetectorFactory,
        frame_rx: Receiver<VideoFrame>,
        result_tx: Sender<Vec<HandLandmarks>>,
        stale_rx: Receiver<Vec<HandLandmarks>>,
    ) {
        let mut detector = match factory() {
            Ok(detector) => detector,
            Err(e) => {
                warn!("Hand detector unavailable, using pointer input only: {:#}", e);
                return;
            }
        };
        info!("Hand detector thread started");

        // Ends once the sender is dropped.
        for frame in frame_rx.iter() {
            let hands = detect_or_empty(detector.as_mut(), &frame);
            if let Err(TrySendError::Full(hands)) = result_tx.try_send(hands) {
                // Replace the unpolled result with the newer one.
                let _ = stale_rx.try_recv();
                let _ = result_tx.try_send(hands);
            }
        }
        debug!("Hand detector thread finished");
    }
}

impl LandmarkProvider for DetectorWorker {
    fn submit(&mut self, frame: &VideoFrame) {
        let Some(tx) = &self.frame_tx else {
            return;
        };
        match tx.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Hand detector busy, dropping frame"),
            Err(TrySendError::Disconnected(_)) => {
                // Worker gave up (initialization failed).
                self.frame_tx = None;
            }
        }
    }

    fn poll(&mut self) -> Option<Vec<HandLandmarks>> {
        self.result_rx.try_iter().last()
    }

    fn shutdown(&mut self) {
        self.frame_tx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Hand detector thread panicked");
            }
        }
    }
}

impl Drop for DetectorWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Inline or background provider, per configuration.
pub fn landmark_provider(config: &DetectorConfig, factory: DetectorFactory) -> Box<dyn LandmarkProvider> {
    if config.background {
        Box::new(DetectorWorker::spawn(factory))
    } else {
        Box::new(InlineLandmarks::new(factory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use anyhow::bail;
    use nalgebra::Point2;

    struct OneHand;

    impl HandLandmarkDetector for OneHand {
        fn detect(&mut self, frame: &VideoFrame, _timestamp_ms: f64) -> Result<Vec<HandLandmarks>> {
            let x = frame.timestamp_ms() / 1000.0;
            Ok(vec![HandLandmarks::from_tips(Point2::new(x, 0.5), Point2::new(x, 0.6))])
        }
    }

    struct Failing;

    impl HandLandmarkDetector for Failing {
        fn detect(&mut self, _frame: &VideoFrame, _timestamp_ms: f64) -> Result<Vec<HandLandmarks>> {
            bail!("model crashed")
        }
    }

    fn one_hand() -> DetectorFactory {
        Box::new(|| -> Result<Box<dyn HandLandmarkDetector>> { Ok(Box::new(OneHand)) })
    }

    fn broken_init() -> DetectorFactory {
        Box::new(|| -> Result<Box<dyn HandLandmarkDetector>> { bail!("no model file") })
    }

    fn poll_until(provider: &mut dyn LandmarkProvider, timeout: Duration) -> Option<Vec<HandLandmarks>> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(hands) = provider.poll() {
                return Some(hands);
            }
            thread::sleep(Duration::from_millis(2));
        }
        None
    }

    #[test]
    fn test_inline_detects_on_submit() {
        let mut inline = InlineLandmarks::new(one_hand());
        assert!(inline.poll().is_none());
        inline.submit(&VideoFrame::blank(32, 24, 250.0));
        let hands = inline.poll().unwrap();
        assert_eq!(hands.len(), 1);
        assert_eq!(hands[0].index_tip(), Point2::new(0.25, 0.5));
        assert!(inline.poll().is_none());
    }

    #[test]
    fn test_inline_init_failure_is_swallowed() {
        let mut inline = InlineLandmarks::new(broken_init());
        assert!(!inline.is_available());
        inline.submit(&VideoFrame::blank(32, 24, 0.0));
        assert!(inline.poll().is_none());
    }

    #[test]
    fn test_detect_error_reports_no_hands() {
        let mut inline = InlineLandmarks::new(Box::new(
            || -> Result<Box<dyn HandLandmarkDetector>> { Ok(Box::new(Failing)) },
        ));
        inline.submit(&VideoFrame::blank(32, 24, 0.0));
        assert_eq!(inline.poll(), Some(Vec::new()));
    }

    #[test]
    fn test_worker_delivers_results() {
        let mut worker = DetectorWorker::spawn(one_hand());
        worker.submit(&VideoFrame::blank(32, 24, 500.0));
        let hands = poll_until(&mut worker, Duration::from_secs(5)).unwrap();
        assert_eq!(hands[0].index_tip(), Point2::new(0.5, 0.5));
        worker.shutdown();
        // Idempotent.
        worker.shutdown();
        worker.submit(&VideoFrame::blank(32, 24, 600.0));
        assert!(worker.poll().is_none());
    }

    #[test]
    fn test_worker_init_failure_is_swallowed() {
        let mut worker = DetectorWorker::spawn(broken_init());
        worker.submit(&VideoFrame::blank(32, 24, 0.0));
        thread::sleep(Duration::from_millis(20));
        worker.submit(&VideoFrame::blank(32, 24, 16.0));
        assert!(worker.poll().is_none());
    }

    #[test]
    fn test_provider_selection() {
        let mut inline = landmark_provider(&DetectorConfig { background: false }, one_hand());
        inline.submit(&VideoFrame::blank(32, 24, 0.0));
        assert!(inline.poll().is_some());
        inline.shutdown();
    }

    #[test]
    fn test_worker_replaces_unpolled_result() {
        let mut worker = DetectorWorker::spawn(one_hand());
        worker.submit(&VideoFrame::blank(32, 24, 100.0));
        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.result_rx.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(worker.result_rx.len(), 1);

        // The first result is never polled; the second must replace it.
        worker.submit(&VideoFrame::blank(32, 24, 200.0));
        worker.shutdown();
        assert_eq!(worker.result_rx.len(), 1);
        let hands = worker.poll().unwrap();
        assert_eq!(hands[0].index_tip(), Point2::new(0.2, 0.5));
        assert!(worker.poll().is_none());
    }
}
