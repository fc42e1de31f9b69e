//! Scripted sessions for headless replay
//!
//! A scenario is a TOML file listing pointer samples and voice utterances at
//! millisecond offsets:
//!
//! ```toml
//! frame_interval_ms = 50
//!
//! [[samples]]
//! at_ms = 0
//! x = 0.9
//! y = 0.1
//!
//! [[samples]]
//! at_ms = 4000        # no x/y: tracking gap
//!
//! [[voice]]
//! at_ms = 6000
//! utterance = "zoom in"
//! ```
//!
//! Replays run against a [`ManualClock`] so the outcome never depends on how
//! fast the machine is.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::clock::{Clock, ManualClock};
use crate::error::{Error, Result};
use crate::geometry::Point;
use crate::interaction::InteractionContext;
use crate::menu::MenuEvent;
use crate::pointer::{PointerSource, ScriptedPointer};
use crate::stats::SharedStats;
use crate::voice;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Keep ticking until this offset even after the last scripted step
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub samples: Vec<SampleStep>,
    #[serde(default)]
    pub voice: Vec<VoiceStep>,
}

fn default_frame_interval_ms() -> u64 {
    33
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleStep {
    pub at_ms: u64,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
}

impl SampleStep {
    pub fn position(&self) -> Option<Point> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some(Point::new(x, y)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceStep {
    pub at_ms: u64,
    pub utterance: String,
}

/// Something observable that happened during a replay
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayEvent {
    Menu { at_ms: u64, event: MenuEvent },
    Voice { at_ms: u64, utterance: String, matched: bool },
    Feedback { at_ms: u64, text: String },
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|source| Error::Scenario {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    /// Offset of the last frame to run
    pub fn end_ms(&self) -> u64 {
        let last_sample = self.samples.iter().map(|s| s.at_ms).max().unwrap_or(0);
        let last_voice = self.voice.iter().map(|v| v.at_ms).max().unwrap_or(0);
        last_sample.max(last_voice).max(self.duration_ms.unwrap_or(0))
    }

    /// Run every frame of the scenario through `ctx`
    ///
    /// Utterances are handled on the frame thread at their offset, before that
    /// frame's pointer sample, which keeps replays deterministic.
    pub fn replay(
        &self,
        ctx: &mut InteractionContext,
        clock: &ManualClock,
        stats: &SharedStats,
    ) -> Vec<ReplayEvent> {
        let start = clock.now();
        let keyframes = self
            .samples
            .iter()
            .map(|s| (Duration::from_millis(s.at_ms), s.position()))
            .collect();
        let mut pointer = ScriptedPointer::new(start, keyframes);

        let mut voice = self.voice.clone();
        voice.sort_by_key(|v| v.at_ms);
        let mut pending = voice.into_iter().peekable();

        let step = self.frame_interval_ms.max(1);
        let end = self.end_ms();
        info!(
            "Replaying {} samples, {} utterances over {}ms",
            self.samples.len(),
            self.voice.len(),
            end
        );

        let mut events = Vec::new();
        let mut last_feedback: Option<String> = None;
        let mut at_ms = 0;
        loop {
            clock.set(start + Duration::from_millis(at_ms));
            let now = clock.now();

            while let Some(v) = pending.next_if(|v| v.at_ms <= at_ms) {
                let matched = voice::handle_utterance(
                    &v.utterance,
                    ctx.dispatcher(),
                    ctx.feedback(),
                    clock,
                    stats,
                );
                events.push(ReplayEvent::Voice {
                    at_ms,
                    utterance: v.utterance,
                    matched,
                });
            }

            let sample = pointer.next_sample(now);
            let view = ctx.tick(&sample, now);
            if view.event != MenuEvent::None {
                events.push(ReplayEvent::Menu {
                    at_ms,
                    event: view.event.clone(),
                });
            }
            if view.feedback != last_feedback {
                if let Some(text) = &view.feedback {
                    events.push(ReplayEvent::Feedback {
                        at_ms,
                        text: text.clone(),
                    });
                }
                last_feedback = view.feedback;
            }

            if at_ms >= end {
                break;
            }
            at_ms = (at_ms + step).min(end);
        }
        events
    }
}
