use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::geometry::{Bounds, Point};
use crate::menu::MenuLayout;

pub const DEFAULT_CONFIG_PATH: &str = "glance.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Frame loop rate in ticks per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default)]
    pub pointer: PointerConfig,
    #[serde(default)]
    pub dwell: DwellConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub menu: MenuConfig,
    #[serde(default)]
    pub toggle: ToggleConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub update_log: UpdateLogConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            pointer: PointerConfig::default(),
            dwell: DwellConfig::default(),
            feedback: FeedbackConfig::default(),
            menu: MenuConfig::default(),
            toggle: ToggleConfig::default(),
            sink: SinkConfig::default(),
            update_log: UpdateLogConfig::default(),
            voice: VoiceConfig::default(),
        }
    }
}

fn default_frame_rate() -> u32 {
    30
}

// ============================================================================
// Pointer Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PointerConfig {
    /// Weight of the newest sample in the moving average, in (0, 1)
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f32,

    /// Continuous absence after which the manual fallback is announced
    #[serde(default = "default_lost_after")]
    pub lost_after_secs: f32,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: default_smoothing_alpha(),
            lost_after_secs: default_lost_after(),
        }
    }
}

fn default_smoothing_alpha() -> f32 {
    0.3
}

fn default_lost_after() -> f32 {
    5.0
}

// ============================================================================
// Dwell / Feedback Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DwellConfig {
    /// Dwell needed on the toggle region to open or close the menu
    #[serde(default = "default_toggle_threshold")]
    pub toggle_threshold_secs: f32,

    /// Dwell needed on a menu row to select it
    #[serde(default = "default_row_threshold")]
    pub row_threshold_secs: f32,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            toggle_threshold_secs: default_toggle_threshold(),
            row_threshold_secs: default_row_threshold(),
        }
    }
}

fn default_toggle_threshold() -> f32 {
    2.0
}

fn default_row_threshold() -> f32 {
    1.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_feedback_duration")]
    pub duration_secs: f32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_feedback_duration(),
        }
    }
}

fn default_feedback_duration() -> f32 {
    3.0
}

// ============================================================================
// Menu / Toggle Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MenuConfig {
    /// Rows shown at once
    #[serde(default = "default_visible_count")]
    pub visible_count: usize,

    /// Minimum time between two scroll steps while hovering an edge band
    #[serde(default = "default_scroll_interval")]
    pub scroll_interval_secs: f32,

    /// Top-left corner of the first row
    #[serde(default = "default_menu_x")]
    pub x: f32,
    #[serde(default = "default_menu_y")]
    pub y: f32,
    #[serde(default = "default_row_width")]
    pub row_width: f32,
    #[serde(default = "default_row_height")]
    pub row_height: f32,

    /// Height of the scroll bands above and below the rows
    #[serde(default = "default_edge_band")]
    pub edge_band: f32,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            visible_count: default_visible_count(),
            scroll_interval_secs: default_scroll_interval(),
            x: default_menu_x(),
            y: default_menu_y(),
            row_width: default_row_width(),
            row_height: default_row_height(),
            edge_band: default_edge_band(),
        }
    }
}

fn default_visible_count() -> usize {
    4
}
fn default_scroll_interval() -> f32 {
    0.6
}
fn default_menu_x() -> f32 {
    0.3
}
fn default_menu_y() -> f32 {
    0.25
}
fn default_row_width() -> f32 {
    0.4
}
fn default_row_height() -> f32 {
    0.12
}
fn default_edge_band() -> f32 {
    0.08
}

impl MenuConfig {
    pub fn layout(&self) -> MenuLayout {
        MenuLayout {
            origin: Point::new(self.x, self.y),
            row_width: self.row_width,
            row_height: self.row_height,
            edge_band: self.edge_band,
            visible_count: self.visible_count,
        }
    }
}

/// The disc that opens and closes the menu
#[derive(Debug, Clone, Deserialize)]
pub struct ToggleConfig {
    #[serde(default = "default_toggle_x")]
    pub x: f32,
    #[serde(default = "default_toggle_y")]
    pub y: f32,
    #[serde(default = "default_toggle_radius")]
    pub radius: f32,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self {
            x: default_toggle_x(),
            y: default_toggle_y(),
            radius: default_toggle_radius(),
        }
    }
}

fn default_toggle_x() -> f32 {
    0.9
}
fn default_toggle_y() -> f32 {
    0.1
}
fn default_toggle_radius() -> f32 {
    0.07
}

impl ToggleConfig {
    pub fn bounds(&self) -> Bounds {
        Bounds::disc(Point::new(self.x, self.y), self.radius)
    }
}

// ============================================================================
// Device Config
// ============================================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Record commands in memory and log them
    #[default]
    Simulated,
    /// Write command lines to `path`, or stdout when no path is set
    Writer,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLogConfig {
    #[serde(default = "default_update_log_path")]
    pub path: PathBuf,
}

impl Default for UpdateLogConfig {
    fn default() -> Self {
        Self {
            path: default_update_log_path(),
        }
    }
}

fn default_update_log_path() -> PathBuf {
    PathBuf::from("update_history.jsonl")
}

// ============================================================================
// Voice Config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    /// Start the voice listener
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Keep the built-in phrase table after the configured phrases
    #[serde(default = "default_true")]
    pub builtin_phrases: bool,

    /// Extra phrase mappings, checked before the built-in ones
    #[serde(default)]
    pub phrases: Vec<PhraseConfig>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            builtin_phrases: true,
            phrases: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PhraseConfig {
    pub phrase: String,
    /// Action name, e.g. `"night_vision_on"` or `"firmware_update:usb"`
    pub action: String,
}

fn default_true() -> bool {
    true
}

/// Seconds from config to a `Duration`, with a fallback for values that
/// cannot be represented
fn secs(value: f32, fallback: Duration) -> Duration {
    Duration::try_from_secs_f32(value).unwrap_or(fallback)
}

impl Config {
    /// Load `path`, or `glance.toml` in the working directory when no path is
    /// given. A missing default file yields the defaults; an explicitly named
    /// file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let config = if !required && !path.exists() {
            Config::default()
        } else {
            let text = fs::read_to_string(&path)?;
            Self::parse(&text).map_err(|source| Error::Config {
                path: path.clone(),
                source,
            })?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!("{} must be positive, got {}", name, v)))
            }
        };

        if self.frame_rate == 0 || self.frame_rate > 240 {
            return Err(Error::InvalidConfig(format!(
                "frame_rate must be between 1 and 240, got {}",
                self.frame_rate
            )));
        }
        if self.menu.visible_count == 0 {
            return Err(Error::InvalidConfig(
                "menu.visible_count must be at least 1".to_string(),
            ));
        }
        let alpha = self.pointer.smoothing_alpha;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "pointer.smoothing_alpha must be in (0, 1), got {}",
                alpha
            )));
        }
        positive("pointer.lost_after_secs", self.pointer.lost_after_secs)?;
        positive("dwell.toggle_threshold_secs", self.dwell.toggle_threshold_secs)?;
        positive("dwell.row_threshold_secs", self.dwell.row_threshold_secs)?;
        positive("feedback.duration_secs", self.feedback.duration_secs)?;
        positive("menu.scroll_interval_secs", self.menu.scroll_interval_secs)?;
        positive("menu.row_width", self.menu.row_width)?;
        positive("menu.row_height", self.menu.row_height)?;
        positive("toggle.radius", self.toggle.radius)?;
        if !(self.menu.edge_band.is_finite() && self.menu.edge_band >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "menu.edge_band must not be negative, got {}",
                self.menu.edge_band
            )));
        }
        for phrase in &self.voice.phrases {
            phrase.action.parse::<crate::command::DeviceAction>()?;
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    pub fn toggle_threshold(&self) -> Duration {
        secs(self.dwell.toggle_threshold_secs, Duration::from_secs(2))
    }

    pub fn row_threshold(&self) -> Duration {
        secs(self.dwell.row_threshold_secs, Duration::from_millis(1500))
    }

    pub fn feedback_duration(&self) -> Duration {
        secs(self.feedback.duration_secs, Duration::from_secs(3))
    }

    pub fn scroll_interval(&self) -> Duration {
        secs(self.menu.scroll_interval_secs, Duration::from_millis(600))
    }

    pub fn pointer_lost_after(&self) -> Duration {
        secs(self.pointer.lost_after_secs, Duration::from_secs(5))
    }
}
