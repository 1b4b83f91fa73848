//! Pinch state machine: Idle → PinchDown → Dragging → Idle.
//!
//! Hand landmarks drive the machine when a hand is detected; otherwise the
//! pointer does, with the button standing in for the pinch. Only the previous
//! `pinching` flag and the drag target survive from one tick to the next.

use nalgebra::Point2;
use tracing::{debug, warn};

use crate::anchors::{AnchorId, AnchorRegistry};
use crate::config::GestureConfig;
use crate::geometry::{CoverTransform, Extent};

use super::hit_test::HitTester;
use super::input::{HandLandmarks, PointerState};
use super::state::{ClickEvent, GesturePhase, GestureSource, GestureState, PinchEdge};

/// Everything the controller reads for one tick.
#[derive(Debug, Clone, Copy)]
pub struct GestureInput<'a> {
    pub hand: Option<&'a HandLandmarks>,
    pub pointer: Option<PointerState>,
    /// Size of the video frame the landmarks were detected in.
    pub video: Extent,
    pub screen: Extent,
}

/// Result of one [`GestureController::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GestureUpdate {
    pub state: GestureState,
    pub click: Option<ClickEvent>,
}

struct Sample {
    source: GestureSource,
    pinching: bool,
    cursor: Option<Point2<f64>>,
}

pub struct GestureController {
    config: GestureConfig,
    pinching: bool,
    drag_target: Option<AnchorId>,
    drag_start: Option<Point2<f64>>,
}

impl GestureController {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            pinching: false,
            drag_target: None,
            drag_start: None,
        }
    }

    pub fn is_pinching(&self) -> bool {
        self.pinching
    }

    pub fn drag_target(&self) -> Option<&AnchorId> {
        self.drag_target.as_ref()
    }

    /// Map a normalized video coordinate to screen pixels.
    ///
    /// An unusable video size falls back to stretching over the screen.
    pub fn map_to_screen(&self, normalized: Point2<f64>, video: Extent, screen: Extent) -> Point2<f64> {
        let normalized = if self.config.mirror_x {
            Point2::new(1.0 - normalized.x, normalized.y)
        } else {
            normalized
        };
        let source = if video.is_valid() { video } else { screen };
        CoverTransform::fit(source, screen).to_screen(&normalized)
    }

    pub fn update(
        &mut self,
        input: &GestureInput<'_>,
        hit_tester: &dyn HitTester,
        registry: &mut AnchorRegistry,
    ) -> GestureUpdate {
        let sample = self.sample(input);
        let mut click = None;
        let mut edge = None;

        let phase = match (self.pinching, sample.pinching) {
            (false, true) => {
                edge = Some(PinchEdge::Start);
                self.drag_start = sample.cursor;
                if let Some(pos) = sample.cursor {
                    if let Some(id) = hit_tester.hit_drag_handle(&pos) {
                        debug!(anchor = %id, x = pos.x, y = pos.y, "Pinch grabbed drag handle");
                        self.drag_target = Some(id);
                    } else if sample.source == GestureSource::Hand {
                        // Real pointer clicks are delivered by the platform itself.
                        if let Some(target) = hit_tester.hit_interactive(&pos) {
                            debug!(target = %target, x = pos.x, y = pos.y, "Synthesizing click");
                            click = Some(ClickEvent { position: pos, target });
                        }
                    }
                }
                GesturePhase::PinchDown
            }
            (true, true) => {
                if let Some(pos) = sample.cursor {
                    self.drag_to(pos, registry);
                }
                GesturePhase::Dragging
            }
            (true, false) => {
                edge = Some(PinchEdge::End);
                if let Some(id) = self.drag_target.take() {
                    debug!(anchor = %id, "Drag released");
                }
                self.drag_start = None;
                GesturePhase::Idle
            }
            (false, false) => GesturePhase::Idle,
        };
        self.pinching = sample.pinching;

        GestureUpdate {
            state: GestureState {
                hand_detected: input.hand.is_some(),
                pinching: sample.pinching,
                phase,
                source: sample.source,
                dragged_anchor_id: self.drag_target.clone(),
                drag_start_screen_pos: self.drag_start,
                cursor: sample.cursor,
                edge,
            },
            click,
        }
    }

    fn sample(&self, input: &GestureInput<'_>) -> Sample {
        if let Some(hand) = input.hand {
            return Sample {
                source: GestureSource::Hand,
                pinching: hand.pinch_distance() < self.config.pinch_threshold,
                cursor: Some(self.map_to_screen(hand.index_tip(), input.video, input.screen)),
            };
        }
        match input.pointer {
            Some(pointer) => Sample {
                source: GestureSource::Pointer,
                pinching: pointer.button_down,
                cursor: Some(pointer.position()),
            },
            None => Sample {
                source: GestureSource::None,
                pinching: false,
                cursor: None,
            },
        }
    }

    /// Absolute placement of the dragged anchor under the cursor.
    fn drag_to(&mut self, pos: Point2<f64>, registry: &mut AnchorRegistry) {
        let Some(id) = self.drag_target.clone() else {
            return;
        };
        if !registry.contains(&id) {
            debug!(anchor = %id, "Dragged anchor was removed");
            self.drag_target = None;
            return;
        }
        if let Err(e) = registry.create_anchor(id, pos.x, pos.y, self.config.drag_depth_m, None) {
            warn!("Drag update failed: {:#}", e);
        }
    }
}
