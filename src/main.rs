use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use glance::clock::{Clock, ManualClock, SystemClock};
use glance::command::{CommandDispatcher, VoicePhraseTable};
use glance::config::Config;
use glance::device::{self, CannedStubs, JsonlUpdateLog, MemoryUpdateLog, UpdateLog};
use glance::feedback;
use glance::geometry::Point;
use glance::interaction::{InteractionContext, ManualAction, run_frame_loop};
use glance::logging::{self, LogTarget};
use glance::menu::{EntryKind, MenuEntry, MenuEvent, default_menu};
use glance::pointer::{AbsentPointer, ChannelPointer, PointerSource, parse_pointer_line};
use glance::render::{KeyInput, TerminalUi};
use glance::scenario::{ReplayEvent, Scenario};
use glance::state::{InputMode, RuntimeState};
use glance::stats::{self, with_stats};
use glance::voice::VoiceListener;

#[derive(Parser)]
#[command(name = "glance", about = "Gaze-driven dwell menu for a head-mounted camera")]
struct Cli {
    /// Config file (defaults to ./glance.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Where interactive runs write their log
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive terminal simulation (default)
    Run {
        /// Read "x y" pointer lines from a file or FIFO instead of the arrow keys
        #[arg(long)]
        pointer_feed: Option<PathBuf>,

        /// Start with no pointer tracking at all
        #[arg(long, conflicts_with = "pointer_feed")]
        no_pointer: bool,
    },
    /// Run a scenario file headless and print what happened
    Replay { scenario: PathBuf },
    /// Print the menu tree and the voice phrase table
    Menu,
    /// Print recorded firmware update attempts
    History,
}

/// Utterances injected by the digit keys
const CANNED_UTTERANCES: [&str; 10] = [
    "hello there",
    "night vision",
    "day mode",
    "take a photo",
    "start recording",
    "stop recording",
    "zoom in",
    "zoom out",
    "battery",
    "update firmware",
];

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or(Command::Run {
        pointer_feed: None,
        no_pointer: false,
    }) {
        Command::Run {
            pointer_feed,
            no_pointer,
        } => {
            let log_path = cli.log_file.unwrap_or_else(logging::default_log_path);
            logging::init(cli.verbose, LogTarget::File(&log_path))
                .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
            let config = load_config(config_path)?;
            run_interactive(&config, pointer_feed, no_pointer)
        }
        Command::Replay { scenario } => {
            logging::init(cli.verbose, LogTarget::Stderr)?;
            let config = load_config(config_path)?;
            run_replay(&config, &scenario)
        }
        Command::Menu => {
            let config = load_config(config_path)?;
            print_menu_tree(&default_menu(), 0);
            let phrases = phrase_table(&config)?;
            println!();
            println!("Voice phrases (first match wins):");
            for (phrase, action) in phrases.entries() {
                println!("  {:<24} {}", phrase, action);
            }
            Ok(())
        }
        Command::History => {
            let config = load_config(config_path)?;
            let records = JsonlUpdateLog::read_all(&config.update_log.path).with_context(|| {
                format!("Failed to read {}", config.update_log.path.display())
            })?;
            if records.is_empty() {
                println!("No firmware updates recorded.");
            }
            for record in records {
                println!("{}  {}", record.timestamp, record.method);
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load(path).context("Failed to load config")?;
    info!("Config: {:?}", config);
    Ok(config)
}

fn phrase_table(config: &Config) -> Result<VoicePhraseTable> {
    VoicePhraseTable::from_config(&config.voice.phrases, config.voice.builtin_phrases)
        .context("Invalid voice phrase in config")
}

fn build_dispatcher(config: &Config, update_log: Arc<dyn UpdateLog>) -> Result<Arc<CommandDispatcher>> {
    Ok(Arc::new(CommandDispatcher::new(
        device::build_sink(&config.sink),
        Arc::new(CannedStubs),
        update_log,
        phrase_table(config)?,
    )))
}

fn run_interactive(config: &Config, pointer_feed: Option<PathBuf>, no_pointer: bool) -> Result<()> {
    let state = RuntimeState::new(config);
    {
        let state = Arc::clone(&state);
        ctrlc::set_handler(move || state.stop()).context("Failed to install Ctrl-C handler")?;
    }

    let stats = stats::new_shared();
    let feedback = feedback::new_shared(config.feedback_duration());
    let dispatcher = build_dispatcher(
        config,
        Arc::new(JsonlUpdateLog::new(&config.update_log.path)),
    )?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (voice_tx, voice_rx) = flume::unbounded::<String>();
    let listener = VoiceListener::spawn(
        voice_rx,
        Arc::clone(&dispatcher),
        Arc::clone(&feedback),
        Arc::clone(&clock),
        Arc::clone(&stats),
        Arc::clone(&state),
    )?;

    let mut ctx = InteractionContext::new(config, default_menu(), dispatcher, feedback, Arc::clone(&stats));

    // Keyboard gaze state, used when no feed is attached
    let mut gaze = Point::CENTER;
    let mut tracking = true;
    let mut keyboard_tx = None;

    let (pointer_tx, pointer_rx) = flume::unbounded::<Option<Point>>();
    let mut source: Box<dyn PointerSource> = if no_pointer {
        Box::new(AbsentPointer)
    } else {
        match pointer_feed {
            Some(path) => spawn_pointer_feed(path, pointer_tx)?,
            None => {
                let _ = pointer_tx.send(Some(gaze));
                keyboard_tx = Some(pointer_tx);
            }
        }
        Box::new(ChannelPointer::new(pointer_rx))
    };

    let mut ui = TerminalUi::new().context("Failed to set up terminal")?;
    let mut cursor = 0usize;

    run_frame_loop(
        &mut ctx,
        source.as_mut(),
        clock.as_ref(),
        &state,
        config.frame_interval(),
        |ctx, view| {
            let manual = state.mode() == InputMode::Manual;
            let rows = view.menu.as_ref().map(|m| m.rows.len()).unwrap_or(0);
            cursor = cursor.min(rows.saturating_sub(1));
            let shown_cursor = (manual && rows > 0).then_some(cursor);

            if let Err(e) = ui.draw(view, shown_cursor, state.mode(), state.is_voice_enabled()) {
                warn!("Draw failed: {}", e);
            }

            let inputs = match ui.poll_input() {
                Ok(inputs) => inputs,
                Err(e) => {
                    warn!("Terminal input failed: {}", e);
                    state.stop();
                    return;
                }
            };

            let now = clock.now();
            for input in inputs {
                match input {
                    KeyInput::Quit => state.stop(),
                    KeyInput::MoveGaze(dx, dy) => {
                        if manual {
                            // Arrows move the selection cursor while tracking is gone
                            if dy < 0.0 {
                                cursor = cursor.saturating_sub(1);
                            } else if dy > 0.0 {
                                cursor += 1;
                            }
                        } else if let Some(tx) = &keyboard_tx {
                            gaze = Point::new(gaze.x + dx, gaze.y + dy).clamped();
                            if tracking {
                                let _ = tx.send(Some(gaze));
                            }
                        }
                    }
                    KeyInput::ToggleTracking => {
                        if let Some(tx) = &keyboard_tx {
                            tracking = !tracking;
                            let _ = tx.send(tracking.then_some(gaze));
                        }
                    }
                    KeyInput::Speak(n) => {
                        let utterance = CANNED_UTTERANCES[n % CANNED_UTTERANCES.len()];
                        info!("Simulated utterance: {:?}", utterance);
                        let _ = voice_tx.send(utterance.to_string());
                    }
                    KeyInput::ToggleVoice => {
                        let text = if state.toggle_voice() {
                            "Voice commands on"
                        } else {
                            "Voice commands off"
                        };
                        ctx.notify(text, now);
                    }
                    KeyInput::Confirm => {
                        ctx.apply_manual(ManualAction::Select(cursor), now);
                        cursor = 0;
                    }
                    KeyInput::Manual(action) => {
                        ctx.apply_manual(action, now);
                        if matches!(action, ManualAction::ToggleMenu | ManualAction::Back) {
                            cursor = 0;
                        }
                    }
                }
            }
        },
    );

    drop(ui);
    drop(voice_tx);
    listener.join();

    print!("{}", with_stats(&stats, |s| s.summary()));
    Ok(())
}

/// Forward a line-oriented tracker feed into the pointer channel
///
/// The channel disconnects when the feed ends, which the frame loop treats as
/// lost tracking.
fn spawn_pointer_feed(path: PathBuf, tx: flume::Sender<Option<Point>>) -> Result<()> {
    thread::Builder::new()
        .name("pointer-feed".to_string())
        .spawn(move || {
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    warn!("Cannot open pointer feed {}: {}", path.display(), e);
                    return;
                }
            };
            for line in BufReader::new(file).lines() {
                let Ok(line) = line else { break };
                match parse_pointer_line(&line) {
                    Some(report) => {
                        if tx.send(report).is_err() {
                            break;
                        }
                    }
                    None => warn!("Ignoring malformed pointer line {:?}", line),
                }
            }
            info!("Pointer feed {} ended", path.display());
        })
        .context("Failed to start pointer feed")?;
    Ok(())
}

fn run_replay(config: &Config, path: &Path) -> Result<()> {
    let scenario = Scenario::load(path).with_context(|| format!("Failed to load {}", path.display()))?;

    let clock = ManualClock::default();
    let stats = stats::new_shared();
    let dispatcher = build_dispatcher(config, Arc::new(MemoryUpdateLog::default()))?;
    let mut ctx = InteractionContext::new(
        config,
        default_menu(),
        dispatcher,
        feedback::new_shared(config.feedback_duration()),
        Arc::clone(&stats),
    );

    for event in scenario.replay(&mut ctx, &clock, &stats) {
        match event {
            ReplayEvent::Menu { at_ms, event } => {
                let text = match event {
                    MenuEvent::Selected(action) => format!("selected {} ({})", action, action.command()),
                    other => format!("{:?}", other),
                };
                println!("{:>7}ms  menu      {}", at_ms, text);
            }
            ReplayEvent::Voice {
                at_ms,
                utterance,
                matched,
            } => {
                let result = if matched { "matched" } else { "ignored" };
                println!("{:>7}ms  voice     {:?} {}", at_ms, utterance, result);
            }
            ReplayEvent::Feedback { at_ms, text } => {
                println!("{:>7}ms  feedback  {}", at_ms, text);
            }
        }
    }

    println!();
    print!("{}", with_stats(&stats, |s| s.summary()));
    Ok(())
}

fn print_menu_tree(entries: &[MenuEntry], depth: usize) {
    let indent = "  ".repeat(depth);
    for entry in entries {
        match &entry.kind {
            EntryKind::Leaf(action) => {
                println!("{}{:<24} {}", indent, entry.label, action.command());
            }
            EntryKind::Submenu(children) => {
                println!("{}{} ▸", indent, entry.label);
                print_menu_tree(children, depth + 1);
            }
            EntryKind::Back => println!("{}{}", indent, entry.label),
        }
    }
}
