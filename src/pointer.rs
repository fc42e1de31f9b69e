//! Pointer input: raw samples, smoothing, and the sources that produce them
//!
//! A pointer source reports one sample per frame tick. Tracking gaps are
//! reported as samples without a position rather than being skipped, so the
//! smoother and every dwell region observe the gap.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::geometry::Point;

pub const DEFAULT_SMOOTHING_ALPHA: f32 = 0.3;

/// One raw reading from the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    /// Frame position, `None` when nothing was detected this tick
    pub position: Option<Point>,
    pub timestamp: Instant,
}

impl PointerSample {
    pub fn at(position: Point, timestamp: Instant) -> Self {
        Self {
            position: Some(position),
            timestamp,
        }
    }

    pub fn absent(timestamp: Instant) -> Self {
        Self {
            position: None,
            timestamp,
        }
    }
}

/// Exponential moving average over pointer positions
#[derive(Debug, Clone)]
pub struct PointerSmoother {
    alpha: f32,
    smoothed: Option<Point>,
}

impl Default for PointerSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_ALPHA)
    }
}

impl PointerSmoother {
    /// `alpha` is the weight of the newest sample and is kept inside (0, 1)
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(0.01, 0.99)
        } else {
            DEFAULT_SMOOTHING_ALPHA
        };
        Self {
            alpha,
            smoothed: None,
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Feed a raw sample and get the stabilized position
    ///
    /// An absent sample clears the filter so that no stale position survives a
    /// tracking gap. The first sample after a gap passes through unchanged.
    pub fn update(&mut self, raw: &PointerSample) -> Option<Point> {
        let Some(position) = raw.position else {
            self.smoothed = None;
            return None;
        };

        let next = match self.smoothed {
            None => position,
            Some(prev) => Point::new(
                self.alpha * position.x + (1.0 - self.alpha) * prev.x,
                self.alpha * position.y + (1.0 - self.alpha) * prev.y,
            ),
        };
        self.smoothed = Some(next);
        Some(next)
    }

    pub fn current(&self) -> Option<Point> {
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.smoothed = None;
    }
}

/// Anything that can produce one pointer sample per frame tick
pub trait PointerSource {
    fn next_sample(&mut self, now: Instant) -> PointerSample;

    /// True once the source can no longer produce positions at all
    fn is_lost(&self) -> bool {
        false
    }
}

/// Source used when no tracker is available: never detects anything
#[derive(Debug, Default)]
pub struct AbsentPointer;

impl PointerSource for AbsentPointer {
    fn next_sample(&mut self, now: Instant) -> PointerSample {
        PointerSample::absent(now)
    }

    fn is_lost(&self) -> bool {
        true
    }
}

/// Live source fed by an external tracker thread
///
/// The tracker sends `Some(point)` or `None` whenever its detection changes; the
/// most recent report holds until the next one arrives.
pub struct ChannelPointer {
    rx: flume::Receiver<Option<Point>>,
    last: Option<Point>,
    disconnected: bool,
}

impl ChannelPointer {
    pub fn new(rx: flume::Receiver<Option<Point>>) -> Self {
        Self {
            rx,
            last: None,
            disconnected: false,
        }
    }
}

impl PointerSource for ChannelPointer {
    fn next_sample(&mut self, now: Instant) -> PointerSample {
        if !self.disconnected {
            loop {
                match self.rx.try_recv() {
                    Ok(report) => self.last = report.map(Point::clamped),
                    Err(flume::TryRecvError::Empty) => break,
                    Err(flume::TryRecvError::Disconnected) => {
                        warn!("Pointer tracker disconnected, treating pointer as absent");
                        self.disconnected = true;
                        self.last = None;
                        break;
                    }
                }
            }
        }
        PointerSample {
            position: self.last,
            timestamp: now,
        }
    }

    fn is_lost(&self) -> bool {
        self.disconnected
    }
}

/// Replays a fixed timeline of positions relative to a start instant
///
/// Between keyframes the most recent keyframe holds; before the first one the
/// pointer is absent.
#[derive(Debug, Clone)]
pub struct ScriptedPointer {
    start: Instant,
    keyframes: Vec<(Duration, Option<Point>)>,
}

impl ScriptedPointer {
    pub fn new(start: Instant, mut keyframes: Vec<(Duration, Option<Point>)>) -> Self {
        keyframes.sort_by_key(|(at, _)| *at);
        Self { start, keyframes }
    }

    /// Time of the last keyframe, relative to the start
    pub fn duration(&self) -> Duration {
        self.keyframes.last().map(|(at, _)| *at).unwrap_or_default()
    }
}

impl PointerSource for ScriptedPointer {
    fn next_sample(&mut self, now: Instant) -> PointerSample {
        let elapsed = now.saturating_duration_since(self.start);
        let position = self
            .keyframes
            .iter()
            .take_while(|(at, _)| *at <= elapsed)
            .last()
            .and_then(|(_, p)| *p);
        PointerSample {
            position,
            timestamp: now,
        }
    }
}

/// Parse one line of a line-oriented tracker feed
///
/// `"0.42 0.17"` is a detection; `"-"`, `"none"` or an empty line is a gap.
/// Anything else is rejected.
pub fn parse_pointer_line(line: &str) -> Option<Option<Point>> {
    let line = line.trim();
    if line.is_empty() || line == "-" || line.eq_ignore_ascii_case("none") {
        return Some(None);
    }
    let mut parts = line.split(|c: char| c.is_whitespace() || c == ',').filter(|s| !s.is_empty());
    let x = parts.next()?.parse::<f32>().ok()?;
    let y = parts.next()?.parse::<f32>().ok()?;
    if parts.next().is_some() || !x.is_finite() || !y.is_finite() {
        debug!("Rejecting pointer line: {:?}", line);
        return None;
    }
    Some(Some(Point::new(x, y)))
}
