//! Session counters and frame timing

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Where a dispatched action came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Menu,
    Voice,
    Manual,
}

#[derive(Clone, Default, Debug)]
pub struct SessionStats {
    pub frames: u64,
    /// Frames where the tracker reported no pointer
    pub absent_frames: u64,
    pub toggle_triggers: u64,
    pub scroll_steps: u64,
    pub menu_dispatches: u64,
    pub voice_dispatches: u64,
    pub manual_dispatches: u64,
    /// Utterances that matched no phrase
    pub voice_misses: u64,
    /// Wall time spent inside ticks
    pub frame_times: FrameTiming,
}

/// Running aggregate of tick durations; holds no per-frame history
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct FrameTiming {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl FrameTiming {
    pub fn record(&mut self, elapsed: Duration) {
        if self.count == 0 || elapsed < self.min {
            self.min = elapsed;
        }
        self.max = self.max.max(elapsed);
        self.total += elapsed;
        self.count += 1;
    }

    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.total.as_nanos() / u128::from(self.count)) as u64)
    }
}

impl SessionStats {
    pub fn record_dispatch(&mut self, origin: Origin) {
        match origin {
            Origin::Menu => self.menu_dispatches += 1,
            Origin::Voice => self.voice_dispatches += 1,
            Origin::Manual => self.manual_dispatches += 1,
        }
    }

    pub fn total_dispatches(&self) -> u64 {
        self.menu_dispatches + self.voice_dispatches + self.manual_dispatches
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();

        if self.frames > 0 {
            let absent = self.absent_frames as f64 / self.frames as f64 * 100.0;
            out.push_str(&format!(
                "Frames: {} ({:.1}% without pointer)\n",
                self.frames, absent
            ));
        }

        let ticks = &self.frame_times;
        if ticks.count > 0 {
            out.push_str(&format!(
                "Tick (n={}): avg={}us min={}us max={}us\n",
                ticks.count,
                ticks.average().as_micros(),
                ticks.min.as_micros(),
                ticks.max.as_micros()
            ));
        }

        if self.toggle_triggers > 0 || self.scroll_steps > 0 {
            out.push_str(&format!(
                "Menu: {} toggles, {} scroll steps\n",
                self.toggle_triggers, self.scroll_steps
            ));
        }

        if self.total_dispatches() > 0 || self.voice_misses > 0 {
            out.push_str(&format!(
                "Dispatches: {} menu, {} voice, {} manual ({} unmatched utterances)\n",
                self.menu_dispatches, self.voice_dispatches, self.manual_dispatches, self.voice_misses
            ));
        }

        if out.is_empty() {
            out.push_str("No stats recorded yet.\n");
        }
        out
    }
}

pub type SharedStats = Arc<Mutex<SessionStats>>;

pub fn new_shared() -> SharedStats {
    Arc::new(Mutex::new(SessionStats::default()))
}

/// Run `f` against the stats, recovering from a poisoned lock
pub fn with_stats<R>(stats: &SharedStats, f: impl FnOnce(&mut SessionStats) -> R) -> R {
    let mut guard = stats.lock().unwrap_or_else(|p| p.into_inner());
    f(&mut guard)
}

/// Timer helper that records one tick's wall time
pub struct FrameTimer<'a> {
    start: Instant,
    stats: &'a SharedStats,
}

impl<'a> FrameTimer<'a> {
    pub fn new(stats: &'a SharedStats) -> Self {
        Self {
            start: Instant::now(),
            stats,
        }
    }

    pub fn finish(self) {
        let elapsed = self.start.elapsed();
        with_stats(self.stats, |s| s.frame_times.record(elapsed));
    }
}
