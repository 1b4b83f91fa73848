//! Headless replay of recorded overlay sessions.
//!
//! A session is a CSV file with one row per tick:
//!
//! ```text
//! t_ms,yaw,pitch,roll,index_x,index_y,thumb_x,thumb_y,mouse_x,mouse_y,mouse_down,event
//! 0,0,0,0,,,,,,,,open:note1
//! 16,0,0,0,,,,,,,,calibrate
//! 33,12.5,0,0,0.51,0.48,0.53,0.49,,,,
//! ```
//!
//! Empty cells mean "no reading this tick". Orientation needs all three
//! angles, a hand needs all four fingertip coordinates, the pointer needs
//! both coordinates (`mouse_down` is `1` while pressed). Events are
//! `calibrate`, `open:<id>` and `close:<id>`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::anchors::AnchorId;
use crate::config::OverlayConfig;
use crate::geometry::{Extent, ScreenPosition};
use crate::gesture::{HandLandmarks, PanelLayout, PointerState};
use crate::orientation::{ManualOrientationSensor, OrientationSample, PermissionStatus};
use crate::system::{
    DetectorFactory, FrameCoordinator, HandLandmarkDetector, InlineLandmarks, LatestCell, TickResult,
};
use crate::vision::VideoFrame;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionRow {
    pub t_ms: f64,
    pub yaw: Option<f64>,
    pub pitch: Option<f64>,
    pub roll: Option<f64>,
    pub index_x: Option<f64>,
    pub index_y: Option<f64>,
    pub thumb_x: Option<f64>,
    pub thumb_y: Option<f64>,
    pub mouse_x: Option<f64>,
    pub mouse_y: Option<f64>,
    pub mouse_down: Option<u8>,
    pub event: Option<String>,
}

impl SessionRow {
    pub fn orientation(&self) -> Option<OrientationSample> {
        Some(OrientationSample::new(self.yaw?, self.pitch?, self.roll?, self.t_ms))
    }

    pub fn hand(&self) -> Option<HandLandmarks> {
        Some(HandLandmarks::from_tips(
            Point2::new(self.index_x?, self.index_y?),
            Point2::new(self.thumb_x?, self.thumb_y?),
        ))
    }

    pub fn pointer(&self) -> Option<PointerState> {
        Some(PointerState::new(
            self.mouse_x?,
            self.mouse_y?,
            self.mouse_down.unwrap_or(0) != 0,
        ))
    }

    pub fn event(&self) -> Result<Option<SessionEvent>> {
        match self.event.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => SessionEvent::parse(text).map(Some),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Calibrate,
    Open(AnchorId),
    Close(AnchorId),
}

impl SessionEvent {
    pub fn parse(text: &str) -> Result<Self> {
        if text == "calibrate" {
            return Ok(Self::Calibrate);
        }
        match text.split_once(':') {
            Some(("open", id)) if !id.is_empty() => Ok(Self::Open(id.into())),
            Some(("close", id)) if !id.is_empty() => Ok(Self::Close(id.into())),
            _ => bail!("unknown session event {:?}", text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub rows: Vec<SessionRow>,
}

impl Session {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open session {:?}", path))?;
        Self::from_reader(file).with_context(|| format!("Failed to parse session {:?}", path))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader);
        let mut rows = Vec::new();
        for (i, record) in rdr.deserialize::<SessionRow>().enumerate() {
            let row = record.with_context(|| format!("Bad session row {}", i + 1))?;
            if let Some(prev) = rows.last().map(|r: &SessionRow| r.t_ms) {
                if row.t_ms < prev {
                    bail!("session row {} goes back in time ({} < {})", i + 1, row.t_ms, prev);
                }
            }
            rows.push(row);
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Plays back the recorded fingertips for a frame timestamp.
pub struct SessionDetector {
    hands: Vec<(f64, Option<HandLandmarks>)>,
}

impl SessionDetector {
    pub fn new(session: &Session) -> Self {
        Self {
            hands: session.rows.iter().map(|r| (r.t_ms, r.hand())).collect(),
        }
    }
}

impl HandLandmarkDetector for SessionDetector {
    fn detect(&mut self, _frame: &VideoFrame, timestamp_ms: f64) -> Result<Vec<HandLandmarks>> {
        let idx = self.hands.partition_point(|(t, _)| *t <= timestamp_ms);
        let hand = idx
            .checked_sub(1)
            .and_then(|i| self.hands[i].1.clone());
        Ok(hand.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    pub viewport: Extent,
    /// Size of the synthetic camera frames fed each tick.
    pub video: Extent,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            viewport: Extent::new(800.0, 600.0),
            video: Extent::new(640.0, 480.0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub ticks: u64,
    pub clicks: usize,
    pub calibrated: bool,
    pub final_anchors: BTreeMap<AnchorId, ScreenPosition>,
}

/// Run a session through a fresh coordinator, calling `on_tick` with every
/// published result.
///
/// Detection always runs inline so that replays are deterministic.
pub fn run_session<F>(
    session: &Session,
    config: &OverlayConfig,
    options: &ReplayOptions,
    mut on_tick: F,
) -> Result<ReplaySummary>
where
    F: FnMut(&TickResult) -> Result<()>,
{
    if !options.video.is_valid() {
        bail!("invalid replay video size {:?}", options.video);
    }
    let frames: LatestCell<VideoFrame> = LatestCell::new();
    let detector = SessionDetector::new(session);
    let factory: DetectorFactory =
        Box::new(move || -> Result<Box<dyn HandLandmarkDetector>> { Ok(Box::new(detector)) });

    let mut coordinator = FrameCoordinator::new(
        config.clone(),
        options.viewport,
        Box::new(ManualOrientationSensor::new(PermissionStatus::Granted)),
        Box::new(frames.clone()),
        Box::new(InlineLandmarks::new(factory)),
    );
    coordinator.start_calibration()?;
    let orientation = coordinator.orientation_sink();
    let pointer = coordinator.pointer_sink();
    let mut layout = PanelLayout::new(config.panels.clone());

    let mut summary = ReplaySummary {
        ticks: 0,
        clicks: 0,
        calibrated: false,
        final_anchors: BTreeMap::new(),
    };

    info!(rows = session.len(), "Replaying session");
    for (i, row) in session.rows.iter().enumerate() {
        if let Some(sample) = row.orientation() {
            orientation.push(sample);
        }
        if let Some(state) = row.pointer() {
            pointer.publish(state);
        }

        match row.event().with_context(|| format!("Bad event in row {}", i + 1))? {
            Some(SessionEvent::Calibrate) => {
                if let Err(e) = coordinator.complete_calibration() {
                    warn!(row = i + 1, "Calibration failed: {:#}", e);
                }
            }
            Some(SessionEvent::Open(id)) => coordinator.open_window(id, None, None)?,
            Some(SessionEvent::Close(id)) => {
                coordinator.close_window(&id);
            }
            None => {}
        }

        frames.publish(VideoFrame::blank(
            options.video.width as u32,
            options.video.height as u32,
            row.t_ms,
        ));

        let Some(result) = coordinator.tick(row.t_ms, &layout) else {
            break;
        };
        layout.update(&result.anchors);
        summary.ticks = result.tick;
        summary.clicks += result.clicks.len();
        summary.calibrated = result.calibrated;
        summary.final_anchors = result.anchors.clone();
        on_tick(&result)?;
    }

    coordinator.stop();
    info!(
        ticks = summary.ticks,
        clicks = summary.clicks,
        calibrated = summary.calibrated,
        "Replay finished"
    );
    Ok(summary)
}
