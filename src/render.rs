//! Terminal front end for interactive runs
//!
//! [`compose`] lays a [`FrameView`] out on a character grid; [`TerminalUi`]
//! owns the raw-mode alternate screen, paints composed frames, and turns key
//! presses into [`KeyInput`]s.

use std::io::{self, Write, stdout};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, ClearType};
use crossterm::{cursor, execute};
use unicode_width::UnicodeWidthChar;

use crate::geometry::{Bounds, Point};
use crate::interaction::{FrameView, ManualAction};
use crate::state::InputMode;

const BAR_FULL: char = '█';
const BAR_EMPTY: char = '░';
const POINTER: char = '+';

/// Distance the simulated gaze moves per arrow key press
pub const GAZE_STEP: f32 = 0.025;

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyInput {
    Quit,
    MoveGaze(f32, f32),
    ToggleTracking,
    /// Canned utterance slot 0-9
    Speak(usize),
    ToggleVoice,
    /// Enter: select the row under the manual cursor
    Confirm,
    Manual(ManualAction),
}

/// Character grid for one frame, `height` rows of `width` cells
///
/// `cursor` marks a visible row slot for manual selection.
pub fn compose(view: &FrameView, cursor: Option<usize>, width: usize, height: usize) -> Vec<String> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let mut grid = vec![vec![' '; width]; height];

    // Toggle region, shaded once a dwell is under way
    let shade = if view.toggle_progress > 0.0 { '▒' } else { '░' };
    fill(&mut grid, &view.toggle_bounds, shade);
    let toggle_label = match view.toggle_progress {
        p if p > 0.0 => format!("MENU {:>3.0}%", p * 100.0),
        _ => "MENU".to_string(),
    };
    put_centered(&mut grid, view.toggle_bounds.center(), &toggle_label);

    if let Some(menu) = &view.menu {
        if menu.can_scroll_up {
            put_centered(&mut grid, menu.top_band.center(), "▲");
        }
        if menu.can_scroll_down {
            put_centered(&mut grid, menu.bottom_band.center(), "▼");
        }
        for (slot, row) in menu.rows.iter().enumerate() {
            let (col, line, cols, _) = cell_rect(&row.bounds, width, height);
            let line = line.min(height - 1);
            let label = if row.is_submenu {
                format!(" {} ▸", row.label)
            } else {
                format!(" {}", row.label)
            };
            let label_cols = display_width(&label).min(cols);
            let bar_cols = cols.saturating_sub(label_cols + 1);
            let filled = (row.progress.clamp(0.0, 1.0) * bar_cols as f32).round() as usize;
            let bar: String = (0..bar_cols)
                .map(|i| if i < filled { BAR_FULL } else { BAR_EMPTY })
                .collect();
            put(&mut grid, col, line, &format!("{} {}", label, bar));
            if cursor == Some(slot) && col > 0 {
                put(&mut grid, col - 1, line, "▶");
            }
        }
        let depth = format!("[{}] {}/{}", menu.depth, menu.scroll_offset + 1, menu.total);
        let (col, line, _, _) = cell_rect(&menu.top_band, width, height);
        put(&mut grid, col, line, &depth);
    }

    if let Some(p) = view.pointer {
        let (col, line) = to_cell(p, width, height);
        grid[line][col] = POINTER;
    }

    grid.into_iter().map(|row| row.into_iter().collect()).collect()
}

/// Status line under the grid
pub fn status_line(view: &FrameView, mode: InputMode, voice_enabled: bool, width: usize) -> String {
    let tracking = match view.pointer {
        Some(p) => format!("({:.2}, {:.2})", p.x, p.y),
        None => "no pointer".to_string(),
    };
    let voice = if voice_enabled { "VOICE" } else { "VOICE OFF" };
    let feedback = view.feedback.as_deref().unwrap_or("");
    let line = format!(" {} | {} | {} | {}", mode, tracking, voice, feedback);
    truncate_to_width(&line, width)
}

fn display_width(text: &str) -> usize {
    text.chars().map(|c| c.width().unwrap_or(0)).sum()
}

fn truncate_to_width(text: &str, width: usize) -> String {
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out
}

fn to_cell(p: Point, width: usize, height: usize) -> (usize, usize) {
    let col = ((p.x.clamp(0.0, 1.0) * width as f32) as usize).min(width - 1);
    let line = ((p.y.clamp(0.0, 1.0) * height as f32) as usize).min(height - 1);
    (col, line)
}

/// Top-left cell, middle line, width and height in cells
fn cell_rect(bounds: &Bounds, width: usize, height: usize) -> (usize, usize, usize, usize) {
    match *bounds {
        Bounds::Rect { x, y, width: w, height: h } => {
            let (col, top) = to_cell(Point::new(x, y), width, height);
            let cols = ((w * width as f32) as usize).max(1);
            let lines = ((h * height as f32) as usize).max(1);
            (col, top + lines / 2, cols, lines)
        }
        Bounds::Disc { center, .. } => {
            let (col, line) = to_cell(center, width, height);
            (col, line, 1, 1)
        }
    }
}

fn fill(grid: &mut [Vec<char>], bounds: &Bounds, c: char) {
    let height = grid.len();
    for (line, row) in grid.iter_mut().enumerate() {
        let width = row.len();
        for (col, cell) in row.iter_mut().enumerate() {
            let center = Point::new(
                (col as f32 + 0.5) / width as f32,
                (line as f32 + 0.5) / height as f32,
            );
            if bounds.contains(center) {
                *cell = c;
            }
        }
    }
}

fn put(grid: &mut [Vec<char>], col: usize, line: usize, text: &str) {
    let Some(row) = grid.get_mut(line) else {
        return;
    };
    for (i, c) in text.chars().enumerate() {
        match row.get_mut(col + i) {
            Some(cell) => *cell = c,
            None => break,
        }
    }
}

fn put_centered(grid: &mut [Vec<char>], center: Point, text: &str) {
    let height = grid.len();
    let width = grid.first().map(Vec::len).unwrap_or(0);
    if width == 0 || height == 0 {
        return;
    }
    let (col, line) = to_cell(center, width, height);
    let half = text.chars().count() / 2;
    put(grid, col.saturating_sub(half), line, text);
}

pub struct TerminalUi {
    tracking: bool,
}

impl TerminalUi {
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(
            stdout(),
            terminal::EnterAlternateScreen,
            cursor::Hide,
            terminal::Clear(ClearType::All)
        )?;
        Ok(Self { tracking: true })
    }

    pub fn draw(
        &mut self,
        view: &FrameView,
        cursor: Option<usize>,
        mode: InputMode,
        voice_enabled: bool,
    ) -> io::Result<()> {
        let (tw, th) = terminal::size()?;
        let w = tw as usize;
        let h = (th as usize).saturating_sub(2); // status + help

        let mut out = String::with_capacity(w * (h + 2) * 4);
        out.push_str("\x1b[H"); // Home cursor
        for line in compose(view, cursor, w, h) {
            out.push_str(&line);
            out.push_str("\r\n");
        }
        out.push_str("\x1b[1m");
        out.push_str(&status_line(view, mode, voice_enabled, w));
        out.push_str("\x1b[0m\x1b[K\r\n");
        let help = if self.tracking {
            " arrows: gaze  x: drop tracking  0-9: speak  v: voice  m/enter/bksp/pgup/pgdn: manual  q: quit"
        } else {
            " tracking dropped (x to restore)  m/enter/bksp/pgup/pgdn: manual  q: quit"
        };
        out.push_str("\x1b[90m");
        out.push_str(&truncate_to_width(help, w));
        out.push_str("\x1b[0m\x1b[K");

        print!("{}", out);
        stdout().flush()
    }

    /// Drain pending key events without blocking
    pub fn poll_input(&mut self) -> io::Result<Vec<KeyInput>> {
        let mut inputs = Vec::new();
        while event::poll(Duration::from_millis(0))? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                inputs.push(KeyInput::Quit);
                continue;
            }
            let input = match key.code {
                KeyCode::Char('q') | KeyCode::Esc => KeyInput::Quit,
                KeyCode::Left => KeyInput::MoveGaze(-GAZE_STEP, 0.0),
                KeyCode::Right => KeyInput::MoveGaze(GAZE_STEP, 0.0),
                KeyCode::Up => KeyInput::MoveGaze(0.0, -GAZE_STEP),
                KeyCode::Down => KeyInput::MoveGaze(0.0, GAZE_STEP),
                KeyCode::Char('x') => {
                    self.tracking = !self.tracking;
                    KeyInput::ToggleTracking
                }
                KeyCode::Char('v') => KeyInput::ToggleVoice,
                KeyCode::Char(c) if c.is_ascii_digit() => {
                    KeyInput::Speak(c.to_digit(10).unwrap_or(0) as usize)
                }
                KeyCode::Char('m') => KeyInput::Manual(ManualAction::ToggleMenu),
                KeyCode::Enter => KeyInput::Confirm,
                KeyCode::Backspace => KeyInput::Manual(ManualAction::Back),
                KeyCode::PageUp => KeyInput::Manual(ManualAction::ScrollUp),
                KeyCode::PageDown => KeyInput::Manual(ManualAction::ScrollDown),
                _ => continue,
            };
            inputs.push(input);
        }
        Ok(inputs)
    }

    pub fn restore(&self) -> io::Result<()> {
        execute!(stdout(), cursor::Show, terminal::LeaveAlternateScreen)?;
        terminal::disable_raw_mode()?;
        Ok(())
    }
}

impl Drop for TerminalUi {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}
