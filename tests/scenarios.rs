//! End-to-end behavior of the dwell menu, voice path, and device side

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use glance::clock::{Clock, ManualClock};
use glance::command::{CommandDispatcher, DeviceAction, UpdateMethod, VoicePhraseTable};
use glance::config::Config;
use glance::device::{CannedStubs, JsonlUpdateLog, MemoryUpdateLog, SimulatedSink, UpdateLog};
use glance::feedback;
use glance::interaction::{InteractionContext, ManualAction};
use glance::menu::{MenuEvent, MenuLayout, MenuStack, ScrollDirection, default_menu};
use glance::scenario::{ReplayEvent, Scenario};
use glance::state::RuntimeState;
use glance::stats::{self, SharedStats};
use glance::voice::{VoiceListener, handle_utterance};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

struct Rig {
    ctx: InteractionContext,
    sink: Arc<SimulatedSink>,
    dispatcher: Arc<CommandDispatcher>,
    stats: SharedStats,
    config: Config,
}

fn rig_with_log(update_log: Arc<dyn UpdateLog>) -> Rig {
    let config = Config::default();
    let sink = Arc::new(SimulatedSink::new());
    let dispatcher = Arc::new(CommandDispatcher::new(
        sink.clone(),
        Arc::new(CannedStubs),
        update_log,
        VoicePhraseTable::default(),
    ));
    let stats = stats::new_shared();
    let ctx = InteractionContext::new(
        &config,
        default_menu(),
        Arc::clone(&dispatcher),
        feedback::new_shared(config.feedback_duration()),
        Arc::clone(&stats),
    );
    Rig {
        ctx,
        sink,
        dispatcher,
        stats,
        config,
    }
}

fn rig() -> Rig {
    rig_with_log(Arc::new(MemoryUpdateLog::default()))
}

fn stack() -> MenuStack {
    MenuStack::new(default_menu(), MenuLayout::default(), ms(1500), ms(600))
}

#[test]
fn night_vision_by_gaze() {
    let mut rig = rig();
    let toggle = rig.config.toggle.bounds().center();
    let row0 = rig.config.menu.layout().row_bounds(0).center();
    let scenario = Scenario::parse(&format!(
        r#"
frame_interval_ms = 50
duration_ms = 9000

[[samples]]
at_ms = 0
x = {}
y = {}

[[samples]]
at_ms = 2100
x = {}
y = {}
"#,
        toggle.x, toggle.y, row0.x, row0.y
    ))
    .unwrap();

    let clock = ManualClock::default();
    let start = clock.now();
    let events = scenario.replay(&mut rig.ctx, &clock, &rig.stats);

    let opened: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            ReplayEvent::Menu { at_ms, event: MenuEvent::Opened } => Some(*at_ms),
            _ => None,
        })
        .collect();
    assert_eq!(opened, vec![2000]);

    let selected: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            ReplayEvent::Menu {
                at_ms,
                event: MenuEvent::Selected(DeviceAction::NightVisionOn),
            } => Some(*at_ms),
            _ => None,
        })
        .collect();
    assert_eq!(selected.len(), 1, "exactly one selection: {:?}", events);
    let selected_at = selected[0];
    // Travel from the toggle plus a full row dwell
    assert!(selected_at >= 3600 && selected_at <= 4000, "selected at {}", selected_at);

    let sent = rig.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_string(), "NIGHT_VISION ON");
    assert!(!rig.ctx.menu().is_open());

    let feedback_at = start + ms(selected_at);
    assert_eq!(
        rig.ctx.view(feedback_at + ms(2999)).feedback.as_deref(),
        Some("Night vision enabled")
    );
    assert_eq!(rig.ctx.view(feedback_at + ms(3000)).feedback, None);
}

#[test]
fn submenu_restores_parent_scroll() {
    let layout = MenuLayout::default();
    let mut stack = stack();
    let t0 = Instant::now();
    assert_eq!(stack.toggle(), MenuEvent::Opened);

    let band = Some(layout.bottom_band(layout.visible_count).center());
    assert_eq!(stack.update(band, t0), MenuEvent::Scrolled(ScrollDirection::Down));
    assert_eq!(stack.update(band, t0 + ms(300)), MenuEvent::None);
    assert_eq!(stack.update(band, t0 + ms(600)), MenuEvent::Scrolled(ScrollDirection::Down));
    assert_eq!(stack.top().unwrap().state().scroll_offset(), 2);

    // "Brightness" now sits in the last visible slot
    let slot3 = Some(layout.row_bounds(3).center());
    assert_eq!(stack.update(slot3, t0 + ms(700)), MenuEvent::None);
    assert_eq!(stack.update(slot3, t0 + ms(2200)), MenuEvent::EnteredSubmenu);
    assert_eq!(stack.depth(), 2);
    assert_eq!(stack.top().unwrap().state().scroll_offset(), 0);
    assert_eq!(stack.top().unwrap().state().entries()[0].label, "Brighter");

    assert_eq!(stack.toggle(), MenuEvent::LeftSubmenu);
    let root = stack.top().unwrap();
    assert!(root.is_open());
    assert_eq!(root.state().scroll_offset(), 2);
    assert_eq!(stack.toggle(), MenuEvent::Closed);
}

#[test]
fn tracking_gap_restarts_row_dwell() {
    let layout = MenuLayout::default();
    let mut stack = stack();
    let t0 = Instant::now();
    stack.toggle();
    let row0 = Some(layout.row_bounds(0).center());

    assert_eq!(stack.update(row0, t0), MenuEvent::None);
    assert_eq!(stack.update(row0, t0 + ms(1000)), MenuEvent::None);
    assert_eq!(stack.update(None, t0 + ms(1100)), MenuEvent::None);
    assert_eq!(stack.update(row0, t0 + ms(1200)), MenuEvent::None);
    assert_eq!(stack.update(row0, t0 + ms(2600)), MenuEvent::None);
    assert_eq!(
        stack.update(row0, t0 + ms(2700)),
        MenuEvent::Selected(DeviceAction::NightVisionOn)
    );
    assert!(!stack.is_open());
}

#[test]
fn scroll_offset_never_leaves_range() {
    let layout = MenuLayout::default();
    let mut stack = stack();
    stack.toggle();
    let top = Some(layout.top_band().center());
    let bottom = Some(layout.bottom_band(layout.visible_count).center());
    let t0 = Instant::now();

    // Deterministic pseudo-random walk over bands, rows and gaps
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    for step in 0..500u64 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let point = match seed % 4 {
            0 => top,
            1 => bottom,
            2 => None,
            _ => Some(layout.row_bounds((seed as usize / 4) % 4).center()),
        };
        if let MenuEvent::Selected(_) = stack.update(point, t0 + ms(step * 250)) {
            stack.toggle();
        }
        if seed % 7 == 0 {
            let direction = if seed % 2 == 0 {
                ScrollDirection::Up
            } else {
                ScrollDirection::Down
            };
            stack.scroll(direction);
        }
        if let Some(top) = stack.top() {
            let state = top.state();
            assert!(state.scroll_offset() <= state.max_offset());
            assert!(state.visible_range().len() <= state.visible_count());
        }
    }
}

#[test]
fn voice_and_menu_dispatch_concurrently() {
    let mut rig = rig();
    let clock = Arc::new(ManualClock::default());
    let (tx, rx) = flume::unbounded();
    let listener = VoiceListener::spawn(
        rx,
        Arc::clone(&rig.dispatcher),
        Arc::clone(rig.ctx.feedback()),
        clock.clone(),
        Arc::clone(&rig.stats),
        RuntimeState::new(&rig.config),
    )
    .unwrap();

    let speaker = thread::spawn(move || {
        for _ in 0..50 {
            tx.send("zoom in".to_string()).unwrap();
            thread::yield_now();
        }
    });

    for _ in 0..50 {
        let now = clock.now();
        assert_eq!(rig.ctx.apply_manual(ManualAction::ToggleMenu, now), MenuEvent::Opened);
        assert_eq!(
            rig.ctx.apply_manual(ManualAction::Select(0), now),
            MenuEvent::Selected(DeviceAction::NightVisionOn)
        );
    }

    speaker.join().unwrap();
    listener.join();

    let sent = rig.sink.sent();
    assert_eq!(sent.len(), 100);
    let zooms = sent.iter().filter(|c| c.to_string() == "ZOOM IN").count();
    let night = sent.iter().filter(|c| c.to_string() == "NIGHT_VISION ON").count();
    assert_eq!((zooms, night), (50, 50));

    let s = rig.stats.lock().unwrap();
    assert_eq!(s.voice_dispatches, 50);
    assert_eq!(s.manual_dispatches, 50);
    let text = rig.ctx.view(clock.now()).feedback;
    assert!(matches!(
        text.as_deref(),
        Some("Zoomed in") | Some("Night vision enabled")
    ));
}

#[test]
fn later_dispatch_owns_the_feedback() {
    let mut rig = rig();
    let clock = ManualClock::default();
    let feedback = Arc::clone(rig.ctx.feedback());

    assert!(handle_utterance("zoom in", &rig.dispatcher, &feedback, &clock, &rig.stats));
    clock.advance(ms(10));
    rig.ctx.apply_manual(ManualAction::ToggleMenu, clock.now());
    rig.ctx.apply_manual(ManualAction::Select(0), clock.now());
    assert_eq!(
        rig.ctx.view(clock.now()).feedback.as_deref(),
        Some("Night vision enabled")
    );

    clock.advance(ms(10));
    assert!(handle_utterance("zoom in", &rig.dispatcher, &feedback, &clock, &rig.stats));
    assert_eq!(rig.ctx.view(clock.now()).feedback.as_deref(), Some("Zoomed in"));

    let sent: Vec<String> = rig.sink.sent().iter().map(|c| c.to_string()).collect();
    assert_eq!(sent, vec!["ZOOM IN", "NIGHT_VISION ON", "ZOOM IN"]);
}

#[test]
fn firmware_update_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("updates.jsonl");
    let mut rig = rig_with_log(Arc::new(JsonlUpdateLog::new(&path)));
    let now = Instant::now();

    rig.ctx.apply_manual(ManualAction::ToggleMenu, now);
    for _ in 0..4 {
        rig.ctx.apply_manual(ManualAction::ScrollDown, now);
    }
    // Window is Stop Recording, Brightness, Zoom, System
    assert_eq!(rig.ctx.apply_manual(ManualAction::Select(3), now), MenuEvent::EnteredSubmenu);
    assert_eq!(rig.ctx.apply_manual(ManualAction::Select(2), now), MenuEvent::EnteredSubmenu);
    assert_eq!(rig.ctx.menu().depth(), 3);
    assert_eq!(
        rig.ctx.apply_manual(ManualAction::Select(1), now),
        MenuEvent::Selected(DeviceAction::FirmwareUpdate(UpdateMethod::Usb))
    );
    assert!(!rig.ctx.menu().is_open());

    assert_eq!(rig.sink.sent()[0].to_string(), "FIRMWARE_UPDATE USB");
    let records = JsonlUpdateLog::read_all(&path).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].method, UpdateMethod::Usb);
}

#[test]
fn stub_actions_skip_the_sink() {
    let mut rig = rig();
    let now = Instant::now();
    rig.ctx.apply_manual(ManualAction::ToggleMenu, now);
    assert_eq!(
        rig.ctx.apply_manual(ManualAction::Select(2), now),
        MenuEvent::Selected(DeviceAction::CapturePhoto)
    );
    assert!(rig.sink.sent().is_empty());
    assert_eq!(rig.ctx.view(now).feedback.as_deref(), Some("Photo captured"));
}

#[test]
fn back_entry_and_manual_back() {
    let mut rig = rig();
    let now = Instant::now();
    rig.ctx.apply_manual(ManualAction::ToggleMenu, now);
    for _ in 0..4 {
        rig.ctx.apply_manual(ManualAction::ScrollDown, now);
    }
    rig.ctx.apply_manual(ManualAction::Select(3), now);
    // System: Battery Status, Run Diagnostics, Firmware Update, Back
    assert_eq!(rig.ctx.apply_manual(ManualAction::Select(3), now), MenuEvent::LeftSubmenu);
    assert_eq!(rig.ctx.menu().depth(), 1);
    assert_eq!(rig.ctx.menu().top().unwrap().state().scroll_offset(), 4);
    assert_eq!(rig.ctx.apply_manual(ManualAction::Back, now), MenuEvent::Closed);
    assert_eq!(rig.ctx.apply_manual(ManualAction::Back, now), MenuEvent::None);
}

#[test]
fn config_phrases_take_priority() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("glance.toml");
    std::fs::write(
        &path,
        r#"
[voice]
builtin_phrases = true

[[voice.phrases]]
phrase = "lights out"
action = "night_vision_on"

[[voice.phrases]]
phrase = "zoom"
action = "zoom_reset"
"#,
    )
    .unwrap();
    let config = Config::load(Some(&path)).unwrap();
    let table = VoicePhraseTable::from_config(&config.voice.phrases, config.voice.builtin_phrases).unwrap();
    assert_eq!(table.lookup("Lights out!"), Some(DeviceAction::NightVisionOn));
    assert_eq!(table.lookup("zoom in"), Some(DeviceAction::ZoomReset));
    assert_eq!(table.lookup("take a photo"), Some(DeviceAction::CapturePhoto));
}

#[test]
fn demo_files_load() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
    let config = Config::load(Some(&root.join("glance.toml"))).unwrap();
    assert_eq!(config.voice.phrases.len(), 2);

    let scenario = Scenario::load(&root.join("night_vision.toml")).unwrap();
    let mut rig = rig();
    let clock = ManualClock::default();
    let events = scenario.replay(&mut rig.ctx, &clock, &rig.stats);
    assert!(events.contains(&ReplayEvent::Voice {
        at_ms: 6000,
        utterance: "zoom in please".to_string(),
        matched: true,
    }));
    assert!(events.contains(&ReplayEvent::Voice {
        at_ms: 7000,
        utterance: "what time is it".to_string(),
        matched: false,
    }));
    let sent: Vec<String> = rig.sink.sent().iter().map(|c| c.to_string()).collect();
    assert_eq!(sent, vec!["NIGHT_VISION ON", "ZOOM IN"]);
}
