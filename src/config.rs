//! Overlay configuration.
//!
//! Every empirically tuned constant of the pipeline (pinch threshold, focal
//! span, clip planes, drift decay, tracker sizes) is a named field here and
//! can be overridden from a TOML file. Missing fields fall back to defaults.

use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default)]
    pub projection: ProjectionConfig,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub panels: PanelConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
}

impl OverlayConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse and validate.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: OverlayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make projection or tracking degenerate.
    pub fn validate(&self) -> Result<()> {
        let p = &self.projection;
        ensure!(
            p.near_epsilon_m.is_finite() && p.near_epsilon_m >= 0.0,
            "projection.near_epsilon_m must be finite and non-negative"
        );
        ensure!(
            p.near_clip_m.is_finite() && p.near_clip_m >= p.near_epsilon_m,
            "projection.near_clip_m must be finite and at least near_epsilon_m"
        );
        ensure!(
            p.far_clip_m.is_finite() && p.far_clip_m > p.near_clip_m,
            "projection.far_clip_m ({}) must be greater than near_clip_m ({})",
            p.far_clip_m,
            p.near_clip_m
        );
        for (name, value) in [
            ("projection.span_fraction", p.span_fraction),
            ("projection.reference_width_m", p.reference_width_m),
            ("projection.reference_distance_m", p.reference_distance_m),
            ("gesture.pinch_threshold", self.gesture.pinch_threshold),
            ("gesture.drag_depth_m", self.gesture.drag_depth_m),
            ("panels.width_px", self.panels.width_px),
            ("panels.height_px", self.panels.height_px),
            ("panels.reference_depth_m", self.panels.reference_depth_m),
        ] {
            ensure!(value.is_finite() && value > 0.0, "{} must be positive, got {}", name, value);
        }

        let pose = &self.pose;
        ensure!(
            (0.0..=1.0).contains(&pose.hint_decay),
            "pose.hint_decay must be within [0, 1], got {}",
            pose.hint_decay
        );
        for (name, value) in [
            ("pose.hint_meters_per_px", pose.hint_meters_per_px),
            ("pose.max_offset_m", pose.max_offset_m),
            ("pose.rotation_flow_tolerance_px", pose.rotation_flow_tolerance_px),
            ("panels.title_bar_px", self.panels.title_bar_px),
        ] {
            ensure!(value.is_finite() && value >= 0.0, "{} must be non-negative, got {}", name, value);
        }

        let m = &self.motion;
        ensure!(
            m.work_width > 0 && m.work_height > 0,
            "motion working resolution must be non-empty"
        );
        ensure!(m.min_matches > 0, "motion.min_matches must be at least 1");
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Pinhole projection and clipping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Anchors at or nearer than this depth are hidden (meters).
    #[serde(default = "default_near_clip")]
    pub near_clip_m: f64,
    /// Anchors beyond this depth are hidden (meters).
    #[serde(default = "default_far_clip")]
    pub far_clip_m: f64,
    /// Depths at or below this are not perspective-divided at all.
    #[serde(default = "default_near_epsilon")]
    pub near_epsilon_m: f64,
    /// Fraction of the viewport width spanned by a reference-width object
    /// seen at the reference distance.
    #[serde(default = "default_span_fraction")]
    pub span_fraction: f64,
    #[serde(default = "default_reference_width")]
    pub reference_width_m: f64,
    #[serde(default = "default_reference_distance")]
    pub reference_distance_m: f64,
}

fn default_near_clip() -> f64 {
    0.2
}

fn default_far_clip() -> f64 {
    10.0
}

fn default_near_epsilon() -> f64 {
    1e-6
}

fn default_span_fraction() -> f64 {
    0.5
}

fn default_reference_width() -> f64 {
    1.0
}

fn default_reference_distance() -> f64 {
    2.0
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            near_clip_m: default_near_clip(),
            far_clip_m: default_far_clip(),
            near_epsilon_m: default_near_epsilon(),
            span_fraction: default_span_fraction(),
            reference_width_m: default_reference_width(),
            reference_distance_m: default_reference_distance(),
        }
    }
}

/// Camera pose fusion (orientation + visual hint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseConfig {
    /// Meters of camera translation per working-resolution pixel of image motion.
    #[serde(default = "default_hint_meters_per_px")]
    pub hint_meters_per_px: f64,
    /// Multiplier applied to the position offset on ticks without a hint.
    #[serde(default = "default_hint_decay")]
    pub hint_decay: f64,
    /// Hard bound on the accumulated position offset (meters).
    #[serde(default = "default_max_offset")]
    pub max_offset_m: f64,
    /// Hint residual (working-resolution pixels, per axis) left after removing
    /// the image motion explained by the measured rotation, below which the
    /// camera is considered not to have translated.
    #[serde(default = "default_rotation_flow_tolerance")]
    pub rotation_flow_tolerance_px: f64,
}

fn default_hint_meters_per_px() -> f64 {
    0.002
}

fn default_hint_decay() -> f64 {
    0.9
}

fn default_max_offset() -> f64 {
    0.5
}

fn default_rotation_flow_tolerance() -> f64 {
    1.0
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            hint_meters_per_px: default_hint_meters_per_px(),
            hint_decay: default_hint_decay(),
            max_offset_m: default_max_offset(),
            rotation_flow_tolerance_px: default_rotation_flow_tolerance(),
        }
    }
}

/// Visual motion estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Working resolution every frame is downscaled to.
    #[serde(default = "default_work_width")]
    pub work_width: u32,
    #[serde(default = "default_work_height")]
    pub work_height: u32,
    /// Corner selection grid; at most one corner per cell.
    #[serde(default = "default_grid_cols")]
    pub grid_cols: u32,
    #[serde(default = "default_grid_rows")]
    pub grid_rows: u32,
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    /// Minimum eigenvalue score per window pixel for a corner to be kept.
    #[serde(default = "default_min_corner_score")]
    pub min_corner_score: f32,
    /// Half-size of the SAD matching patch (pixels).
    #[serde(default = "default_patch_radius")]
    pub patch_radius: u32,
    /// Half-size of the displacement search window (pixels).
    #[serde(default = "default_search_radius")]
    pub search_radius: u32,
    /// Mean absolute intensity difference above which a match is rejected.
    #[serde(default = "default_max_mean_abs_diff")]
    pub max_mean_abs_diff: f32,
    /// Fewer accepted matches than this yields a zero hint.
    #[serde(default = "default_min_matches")]
    pub min_matches: usize,
}

fn default_work_width() -> u32 {
    320
}

fn default_work_height() -> u32 {
    240
}

fn default_grid_cols() -> u32 {
    12
}

fn default_grid_rows() -> u32 {
    9
}

fn default_max_features() -> usize {
    100
}

fn default_min_corner_score() -> f32 {
    25.0
}

fn default_patch_radius() -> u32 {
    3
}

fn default_search_radius() -> u32 {
    8
}

fn default_max_mean_abs_diff() -> f32 {
    12.0
}

fn default_min_matches() -> usize {
    8
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            work_width: default_work_width(),
            work_height: default_work_height(),
            grid_cols: default_grid_cols(),
            grid_rows: default_grid_rows(),
            max_features: default_max_features(),
            min_corner_score: default_min_corner_score(),
            patch_radius: default_patch_radius(),
            search_radius: default_search_radius(),
            max_mean_abs_diff: default_max_mean_abs_diff(),
            min_matches: default_min_matches(),
        }
    }
}

/// Pinch interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GestureConfig {
    /// Index-tip to thumb-tip distance (normalized video units) below which
    /// the hand counts as pinching.
    #[serde(default = "default_pinch_threshold")]
    pub pinch_threshold: f64,
    /// Depth at which a dragged window is re-placed every tick (meters).
    #[serde(default = "default_drag_depth")]
    pub drag_depth_m: f64,
    /// Mirror landmark x before mapping (selfie-style video).
    #[serde(default)]
    pub mirror_x: bool,
}

fn default_pinch_threshold() -> f64 {
    0.06
}

fn default_drag_depth() -> f64 {
    2.0
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            pinch_threshold: default_pinch_threshold(),
            drag_depth_m: default_drag_depth(),
            mirror_x: false,
        }
    }
}

/// Panel geometry used by the built-in hit tester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Panel size on screen when its anchor sits at `reference_depth_m`.
    #[serde(default = "default_panel_width")]
    pub width_px: f64,
    #[serde(default = "default_panel_height")]
    pub height_px: f64,
    /// Height of the title-bar drag handle at the reference depth.
    #[serde(default = "default_title_bar")]
    pub title_bar_px: f64,
    #[serde(default = "default_panel_depth")]
    pub reference_depth_m: f64,
}

fn default_panel_width() -> f64 {
    320.0
}

fn default_panel_height() -> f64 {
    240.0
}

fn default_title_bar() -> f64 {
    36.0
}

fn default_panel_depth() -> f64 {
    2.0
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            width_px: default_panel_width(),
            height_px: default_panel_height(),
            title_bar_px: default_title_bar(),
            reference_depth_m: default_panel_depth(),
        }
    }
}

/// Hand-landmark detector scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Run detection on a background thread instead of inside the tick.
    #[serde(default = "default_background")]
    pub background: bool,
}

fn default_background() -> bool {
    true
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            background: default_background(),
        }
    }
}
