//! The per-frame interaction loop
//!
//! [`InteractionContext`] owns everything a frame needs: the smoother, the
//! toggle region, the menu stack, and handles to the shared feedback channel,
//! dispatcher, and stats. Each tick takes one raw pointer sample and produces
//! a [`FrameView`] for whatever is drawing the screen.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::command::{CommandDispatcher, DeviceAction};
use crate::config::Config;
use crate::dwell::{DwellRegion, DwellStatus};
use crate::feedback::SharedFeedback;
use crate::geometry::{Bounds, Point};
use crate::menu::{MenuEntry, MenuEvent, MenuStack, MenuView, ScrollDirection};
use crate::pointer::{PointerSample, PointerSmoother, PointerSource};
use crate::state::RuntimeState;
use crate::stats::{FrameTimer, Origin, SharedStats, with_stats};

/// Menu control without a pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualAction {
    ToggleMenu,
    ScrollUp,
    ScrollDown,
    /// Visible row, counted from the top of the window
    Select(usize),
    Back,
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameView {
    /// Smoothed pointer, if tracked this frame
    pub pointer: Option<Point>,
    pub toggle_bounds: Bounds,
    pub toggle_progress: f32,
    pub menu: Option<MenuView>,
    pub feedback: Option<String>,
    pub event: MenuEvent,
}

pub struct InteractionContext {
    smoother: PointerSmoother,
    toggle: DwellRegion,
    menu: MenuStack,
    feedback: SharedFeedback,
    dispatcher: Arc<CommandDispatcher>,
    stats: SharedStats,
    lost_after: Duration,
    absent_since: Option<Instant>,
}

impl InteractionContext {
    pub fn new(
        config: &Config,
        root: Vec<MenuEntry>,
        dispatcher: Arc<CommandDispatcher>,
        feedback: SharedFeedback,
        stats: SharedStats,
    ) -> Self {
        Self {
            smoother: PointerSmoother::new(config.pointer.smoothing_alpha),
            toggle: DwellRegion::new("menu-toggle", config.toggle.bounds(), config.toggle_threshold()),
            menu: MenuStack::new(
                root,
                config.menu.layout(),
                config.row_threshold(),
                config.scroll_interval(),
            ),
            feedback,
            dispatcher,
            stats,
            lost_after: config.pointer_lost_after(),
            absent_since: None,
        }
    }

    pub fn menu(&self) -> &MenuStack {
        &self.menu
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn feedback(&self) -> &SharedFeedback {
        &self.feedback
    }

    /// Process one frame
    ///
    /// The toggle region is evaluated first. A frame where it fires, or where
    /// the pointer sits on it, does not reach the menu rows.
    pub fn tick(&mut self, sample: &PointerSample, now: Instant) -> FrameView {
        let stats = Arc::clone(&self.stats);
        let timer = FrameTimer::new(&stats);

        match sample.position {
            Some(_) => self.absent_since = None,
            None => {
                self.absent_since.get_or_insert(now);
            }
        }
        with_stats(&self.stats, |s| {
            s.frames += 1;
            if sample.position.is_none() {
                s.absent_frames += 1;
            }
        });

        let point = self.smoother.update(sample);
        let toggle_status = self.toggle.evaluate(point, now);
        let over_toggle = point.is_some_and(|p| self.toggle.bounds.contains(p));

        let event = if toggle_status == DwellStatus::Triggered {
            with_stats(&self.stats, |s| s.toggle_triggers += 1);
            self.menu.toggle()
        } else if self.menu.is_open() {
            let menu_point = if over_toggle { None } else { point };
            self.menu.update(menu_point, now)
        } else {
            MenuEvent::None
        };

        self.handle_event(&event, Origin::Menu, now);

        let view = self.frame_view(point, event, now);
        timer.finish();
        view
    }

    /// Drive the menu directly, with the same transitions a dwell would cause
    pub fn apply_manual(&mut self, action: ManualAction, now: Instant) -> MenuEvent {
        let event = match action {
            ManualAction::ToggleMenu => self.menu.toggle(),
            ManualAction::ScrollUp => self.menu.scroll(ScrollDirection::Up),
            ManualAction::ScrollDown => self.menu.scroll(ScrollDirection::Down),
            ManualAction::Select(slot) => self.menu.select(slot),
            ManualAction::Back => self.menu.pop(),
        };
        debug!("Manual {:?} -> {:?}", action, event);
        self.handle_event(&event, Origin::Manual, now);
        event
    }

    /// Show a message that did not come from a dispatch
    pub fn notify(&self, text: impl Into<String>, now: Instant) {
        self.feedback
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .set(text, now);
    }

    /// How long the tracker has been reporting no pointer
    pub fn absent_for(&self, now: Instant) -> Option<Duration> {
        self.absent_since.map(|since| now.saturating_duration_since(since))
    }

    pub fn is_pointer_lost(&self, now: Instant) -> bool {
        self.absent_for(now).is_some_and(|d| d >= self.lost_after)
    }

    /// Snapshot without advancing anything
    pub fn view(&self, now: Instant) -> FrameView {
        self.frame_view(self.smoother.current(), MenuEvent::None, now)
    }

    fn handle_event(&mut self, event: &MenuEvent, origin: Origin, now: Instant) {
        match event {
            MenuEvent::None => {}
            MenuEvent::Selected(action) => self.dispatch(action, origin, now),
            MenuEvent::Scrolled(_) => with_stats(&self.stats, |s| s.scroll_steps += 1),
            MenuEvent::Opened
            | MenuEvent::Closed
            | MenuEvent::EnteredSubmenu
            | MenuEvent::LeftSubmenu => {
                debug!("Menu {:?}, depth {}", event, self.menu.depth());
            }
        }
    }

    fn dispatch(&mut self, action: &DeviceAction, origin: Origin, now: Instant) {
        let text = self.dispatcher.dispatch(action);
        self.notify(text, now);
        with_stats(&self.stats, |s| s.record_dispatch(origin));
    }

    fn frame_view(&self, pointer: Option<Point>, event: MenuEvent, now: Instant) -> FrameView {
        let feedback = self
            .feedback
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .current(now)
            .map(str::to_owned);
        FrameView {
            pointer,
            toggle_bounds: self.toggle.bounds,
            toggle_progress: self.toggle.progress(now),
            menu: self.menu.view(now),
            feedback,
            event,
        }
    }
}

/// Pull one pointer sample per frame until the runtime stops
///
/// `on_frame` runs after every tick and may drive the context further, for
/// example with manual actions from the keyboard.
pub fn run_frame_loop<F>(
    ctx: &mut InteractionContext,
    source: &mut dyn PointerSource,
    clock: &dyn Clock,
    state: &RuntimeState,
    frame_interval: Duration,
    mut on_frame: F,
) where
    F: FnMut(&mut InteractionContext, &FrameView),
{
    info!("Frame loop started ({:?} per frame)", frame_interval);
    while state.is_running() {
        let started = Instant::now();
        let now = clock.now();

        let sample = source.next_sample(now);
        let view = ctx.tick(&sample, now);

        let lost = source.is_lost() || ctx.is_pointer_lost(now);
        if state.set_pointer_lost(lost) {
            if lost {
                warn!("Pointer tracking lost, switching to manual input");
                ctx.notify("Tracking lost - manual controls", now);
            } else {
                info!("Pointer tracking restored");
                ctx.notify("Tracking restored", now);
            }
        }

        on_frame(ctx, &view);

        if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
    info!("Frame loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::VoicePhraseTable;
    use crate::device::{CannedStubs, MemoryUpdateLog, SimulatedSink};
    use crate::feedback;
    use crate::menu::default_menu;
    use crate::stats;

    struct Fixture {
        ctx: InteractionContext,
        sink: Arc<SimulatedSink>,
        stats: SharedStats,
        config: Config,
    }

    fn fixture() -> Fixture {
        let config = Config::default();
        let sink = Arc::new(SimulatedSink::new());
        let dispatcher = Arc::new(CommandDispatcher::new(
            sink.clone(),
            Arc::new(CannedStubs),
            Arc::new(MemoryUpdateLog::default()),
            VoicePhraseTable::default(),
        ));
        let stats = stats::new_shared();
        let ctx = InteractionContext::new(
            &config,
            default_menu(),
            dispatcher,
            feedback::new_shared(config.feedback_duration()),
            stats.clone(),
        );
        Fixture {
            ctx,
            sink,
            stats,
            config,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Hold the pointer at `point` for `[from, to]` in 100ms frames
    fn hold(ctx: &mut InteractionContext, point: Option<Point>, t0: Instant, from: u64, to: u64) -> FrameView {
        let mut view = None;
        let mut t = from;
        while t <= to {
            let now = t0 + ms(t);
            let sample = match point {
                Some(p) => PointerSample::at(p, now),
                None => PointerSample::absent(now),
            };
            view = Some(ctx.tick(&sample, now));
            t += 100;
        }
        view.expect("at least one frame")
    }

    #[test]
    fn test_toggle_opens_menu() {
        let mut f = fixture();
        let t0 = Instant::now();
        let toggle = Some(f.config.toggle.bounds().center());
        let view = hold(&mut f.ctx, toggle, t0, 0, 1900);
        assert!(view.menu.is_none());
        assert!(view.toggle_progress > 0.9);
        let view = hold(&mut f.ctx, toggle, t0, 2000, 2000);
        assert_eq!(view.event, MenuEvent::Opened);
        assert!(view.menu.is_some());
        // Staying on the toggle does not close it again
        let view = hold(&mut f.ctx, toggle, t0, 2100, 6000);
        assert!(view.menu.is_some());
    }

    #[test]
    fn test_dwell_dispatches_once() {
        let mut f = fixture();
        let t0 = Instant::now();
        let toggle = Some(f.config.toggle.bounds().center());
        hold(&mut f.ctx, toggle, t0, 0, 2000);
        assert!(f.ctx.menu().is_open());

        let row0 = Some(f.config.menu.layout().row_bounds(0).center());
        // The smoother needs a few frames to travel from the toggle to the row
        let view = hold(&mut f.ctx, row0, t0, 2100, 6000);
        assert!(view.menu.is_none());
        assert_eq!(f.sink.sent().len(), 1);
        assert_eq!(f.sink.sent()[0].to_string(), "NIGHT_VISION ON");
        let s = f.stats.lock().unwrap();
        assert_eq!(s.menu_dispatches, 1);
        assert_eq!(s.toggle_triggers, 1);
    }

    #[test]
    fn test_toggle_takes_precedence_over_rows() {
        let mut config = Config::default();
        // Put the toggle disc on top of the first row
        let row0 = config.menu.layout().row_bounds(0).center();
        config.toggle.x = row0.x;
        config.toggle.y = row0.y;
        let mut f = fixture();
        f.ctx = InteractionContext::new(
            &config,
            default_menu(),
            f.ctx.dispatcher().clone(),
            feedback::new_shared(config.feedback_duration()),
            f.stats.clone(),
        );
        let t0 = Instant::now();
        let view = hold(&mut f.ctx, Some(row0), t0, 0, 2000);
        assert_eq!(view.event, MenuEvent::Opened);
        hold(&mut f.ctx, Some(row0), t0, 2100, 5000);
        assert!(f.sink.sent().is_empty());
        assert!(f.ctx.menu().is_open());
    }

    #[test]
    fn test_manual_path_matches_dwell() {
        let mut f = fixture();
        let t0 = Instant::now();
        assert_eq!(f.ctx.apply_manual(ManualAction::ToggleMenu, t0), MenuEvent::Opened);
        assert_eq!(f.ctx.apply_manual(ManualAction::ScrollDown, t0), MenuEvent::Scrolled(ScrollDirection::Down));
        assert_eq!(f.ctx.apply_manual(ManualAction::ScrollUp, t0), MenuEvent::Scrolled(ScrollDirection::Up));
        assert_eq!(f.ctx.apply_manual(ManualAction::ScrollUp, t0), MenuEvent::None);
        assert_eq!(
            f.ctx.apply_manual(ManualAction::Select(1), t0),
            MenuEvent::Selected(DeviceAction::NightVisionOff)
        );
        assert_eq!(f.sink.sent()[0].to_string(), "NIGHT_VISION OFF");
        let view = f.ctx.view(t0 + ms(10));
        assert_eq!(view.feedback.as_deref(), Some("Night vision disabled"));
        assert_eq!(f.stats.lock().unwrap().manual_dispatches, 1);
    }

    #[test]
    fn test_resumed_parent_forgets_partial_dwell() {
        let mut f = fixture();
        let t0 = Instant::now();
        let row1 = Some(f.config.menu.layout().row_bounds(1).center());
        f.ctx.apply_manual(ManualAction::ToggleMenu, t0);
        f.ctx.apply_manual(ManualAction::ScrollDown, t0);
        f.ctx.apply_manual(ManualAction::ScrollDown, t0);

        // Part way into Start Recording, then Brightness from the keyboard
        hold(&mut f.ctx, row1, t0, 0, 200);
        assert_eq!(f.ctx.apply_manual(ManualAction::Select(3), t0 + ms(200)), MenuEvent::EnteredSubmenu);
        hold(&mut f.ctx, None, t0, 300, 4900);
        assert_eq!(f.ctx.apply_manual(ManualAction::Back, t0 + ms(5000)), MenuEvent::LeftSubmenu);

        let view = hold(&mut f.ctx, row1, t0, 5000, 5000);
        assert_eq!(view.event, MenuEvent::None);
        hold(&mut f.ctx, row1, t0, 5100, 6400);
        assert!(f.sink.sent().is_empty());
        let view = hold(&mut f.ctx, row1, t0, 6500, 6500);
        assert_eq!(view.event, MenuEvent::Selected(DeviceAction::RecordStart));
    }

    #[test]
    fn test_pointer_loss_tracking() {
        let mut f = fixture();
        let t0 = Instant::now();
        hold(&mut f.ctx, Some(Point::CENTER), t0, 0, 100);
        hold(&mut f.ctx, None, t0, 200, 4000);
        assert!(!f.ctx.is_pointer_lost(t0 + ms(4000)));
        hold(&mut f.ctx, None, t0, 4100, 5200);
        assert!(f.ctx.is_pointer_lost(t0 + ms(5200)));
        hold(&mut f.ctx, Some(Point::CENTER), t0, 5300, 5300);
        assert_eq!(f.ctx.absent_for(t0 + ms(5300)), None);
    }
}
