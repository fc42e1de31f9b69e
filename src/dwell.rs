//! Dwell regions: hover-to-select over a fixed area
//!
//! A region accumulates time only while the smoothed pointer stays inside it
//! on consecutive frames. Leaving the area, or losing the pointer, resets the
//! dwell completely. A completed dwell fires once and then stays quiet until the
//! pointer has left the region.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::geometry::{Bounds, Point};

/// Result of evaluating one region for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DwellStatus {
    Idle,
    /// Progress toward the threshold, in `[0, 1)`
    Hovering(f32),
    Triggered,
}

impl DwellStatus {
    pub fn is_triggered(&self) -> bool {
        matches!(self, DwellStatus::Triggered)
    }

    /// Progress for display, `1.0` on the triggering frame
    pub fn progress(&self) -> f32 {
        match self {
            DwellStatus::Idle => 0.0,
            DwellStatus::Hovering(p) => *p,
            DwellStatus::Triggered => 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DwellRegion {
    pub id: String,
    pub bounds: Bounds,
    pub threshold: Duration,
    dwell_start: Option<Instant>,
    /// Set after a trigger, cleared when the pointer leaves
    spent: bool,
}

impl DwellRegion {
    pub fn new(id: impl Into<String>, bounds: Bounds, threshold: Duration) -> Self {
        Self {
            id: id.into(),
            bounds,
            threshold,
            dwell_start: None,
            spent: false,
        }
    }

    pub fn dwell_start(&self) -> Option<Instant> {
        self.dwell_start
    }

    /// Advance the region by one frame
    pub fn evaluate(&mut self, point: Option<Point>, now: Instant) -> DwellStatus {
        let inside = point.is_some_and(|p| self.bounds.contains(p));
        if !inside {
            self.reset();
            return DwellStatus::Idle;
        }

        if self.spent {
            return DwellStatus::Idle;
        }

        let Some(start) = self.dwell_start else {
            self.dwell_start = Some(now);
            return DwellStatus::Hovering(0.0);
        };

        let elapsed = now.saturating_duration_since(start);
        if elapsed >= self.threshold {
            debug!("Dwell on {} triggered after {:?}", self.id, elapsed);
            self.dwell_start = None;
            self.spent = true;
            return DwellStatus::Triggered;
        }

        DwellStatus::Hovering(ratio(elapsed, self.threshold))
    }

    /// Current hover progress without advancing the region
    pub fn progress(&self, now: Instant) -> f32 {
        self.dwell_start
            .map(|start| ratio(now.saturating_duration_since(start), self.threshold).min(1.0))
            .unwrap_or(0.0)
    }

    /// Drop any partial dwell but keep a spent region latched
    pub fn cancel(&mut self) {
        self.dwell_start = None;
    }

    /// Drop any partial dwell and re-arm the region
    pub fn reset(&mut self) {
        self.dwell_start = None;
        self.spent = false;
    }
}

fn ratio(elapsed: Duration, threshold: Duration) -> f32 {
    if threshold.is_zero() {
        return 0.0;
    }
    (elapsed.as_secs_f64() / threshold.as_secs_f64()) as f32
}

/// Evaluate regions in order and report the first one the pointer is inside
///
/// Every region is advanced so that the ones not under the pointer reset; the
/// returned index is the first region whose status is not `Idle` after the
/// update, which gives earlier regions precedence where bounds overlap.
pub fn evaluate_first(
    regions: &mut [DwellRegion],
    point: Option<Point>,
    now: Instant,
) -> Option<(usize, DwellStatus)> {
    let mut first = None;
    for (index, region) in regions.iter_mut().enumerate() {
        if first.is_some() {
            region.reset();
            continue;
        }
        let status = region.evaluate(point, now);
        if status != DwellStatus::Idle {
            first = Some((index, status));
        }
    }
    first
}
