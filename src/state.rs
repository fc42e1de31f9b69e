//! Shared runtime state - thread-safe flags read by the frame loop, the voice
//! listener and the terminal front end
//!
//! Everything here is a plain atomic so any thread can flip a flag without
//! taking a lock. Pass `Arc<RuntimeState>` to the components that need it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::config::Config;

/// Where menu input currently comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InputMode {
    /// Gaze pointer drives dwell regions (default)
    Pointer = 0,
    /// Tracking is unavailable; keys drive the menu directly
    Manual = 1,
}

impl From<u8> for InputMode {
    fn from(v: u8) -> Self {
        match v {
            1 => InputMode::Manual,
            _ => InputMode::Pointer,
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Pointer => write!(f, "Gaze"),
            InputMode::Manual => write!(f, "Manual"),
        }
    }
}

pub struct RuntimeState {
    // ========================================================================
    // Lifecycle
    // ========================================================================
    /// Cleared by Ctrl-C or the quit key; every loop polls it
    running: AtomicBool,

    // ========================================================================
    // Input
    // ========================================================================
    /// Current input mode (stored as u8)
    mode: AtomicU8,
    /// Pointer tracking has been absent longer than the configured limit
    pub pointer_lost: AtomicBool,

    // ========================================================================
    // Voice
    // ========================================================================
    /// Recognized utterances are acted on
    pub voice_enabled: AtomicBool,
}

impl RuntimeState {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(true),
            mode: AtomicU8::new(InputMode::Pointer as u8),
            pointer_lost: AtomicBool::new(false),
            voice_enabled: AtomicBool::new(config.voice.enabled),
        })
    }

    // ========================================================================
    // Lifecycle helpers
    // ========================================================================

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask every loop to wind down
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    // ========================================================================
    // Mode helpers
    // ========================================================================

    pub fn mode(&self) -> InputMode {
        InputMode::from(self.mode.load(Ordering::SeqCst))
    }

    pub fn set_mode(&self, mode: InputMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    /// Record whether the pointer is lost, switching to manual input when it
    /// is. Returns true if the mode changed.
    pub fn set_pointer_lost(&self, lost: bool) -> bool {
        let was = self.pointer_lost.swap(lost, Ordering::SeqCst);
        if was == lost {
            return false;
        }
        if lost {
            self.set_mode(InputMode::Manual);
        } else {
            self.set_mode(InputMode::Pointer);
        }
        true
    }

    // ========================================================================
    // Toggle helpers (for keys)
    // ========================================================================

    /// Toggle voice command handling, returns new state
    pub fn toggle_voice(&self) -> bool {
        let new_state = !self.voice_enabled.load(Ordering::SeqCst);
        self.voice_enabled.store(new_state, Ordering::SeqCst);
        new_state
    }

    pub fn is_voice_enabled(&self) -> bool {
        self.voice_enabled.load(Ordering::SeqCst)
    }

    /// Flip between gaze and manual input, returns the new mode
    pub fn toggle_mode(&self) -> InputMode {
        let next = match self.mode() {
            InputMode::Pointer => InputMode::Manual,
            InputMode::Manual => InputMode::Pointer,
        };
        self.set_mode(next);
        next
    }
}

impl fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeState")
            .field("running", &self.is_running())
            .field("mode", &self.mode())
            .field("pointer_lost", &self.pointer_lost.load(Ordering::SeqCst))
            .field("voice_enabled", &self.is_voice_enabled())
            .finish()
    }
}

/// Type alias for shared state
pub type SharedState = Arc<RuntimeState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_loss_switches_mode() {
        let state = RuntimeState::new(&Config::default());
        assert_eq!(state.mode(), InputMode::Pointer);
        assert!(state.set_pointer_lost(true));
        assert_eq!(state.mode(), InputMode::Manual);
        assert!(!state.set_pointer_lost(true));
        assert!(state.set_pointer_lost(false));
        assert_eq!(state.mode(), InputMode::Pointer);
    }

    #[test]
    fn test_stop() {
        let state = RuntimeState::new(&Config::default());
        assert!(state.is_running());
        state.stop();
        assert!(!state.is_running());
    }

    #[test]
    fn test_toggles() {
        let state = RuntimeState::new(&Config::default());
        assert!(state.is_voice_enabled());
        assert!(!state.toggle_voice());
        assert_eq!(state.toggle_mode(), InputMode::Manual);
        assert_eq!(state.toggle_mode(), InputMode::Pointer);
    }
}
