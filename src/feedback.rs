//! Transient on-screen confirmation messages

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_FEEDBACK_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackMessage {
    pub text: String,
    pub created_at: Instant,
    pub duration: Duration,
}

/// Holds at most one message; a new one replaces the old immediately
#[derive(Debug, Clone)]
pub struct FeedbackChannel {
    duration: Duration,
    message: Option<FeedbackMessage>,
}

impl Default for FeedbackChannel {
    fn default() -> Self {
        Self::new(DEFAULT_FEEDBACK_DURATION)
    }
}

impl FeedbackChannel {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            message: None,
        }
    }

    pub fn set(&mut self, text: impl Into<String>, now: Instant) {
        self.message = Some(FeedbackMessage {
            text: text.into(),
            created_at: now,
            duration: self.duration,
        });
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.message
            .as_ref()
            .is_some_and(|m| now.saturating_duration_since(m.created_at) < m.duration)
    }

    /// Text of the live message, if it has not expired
    pub fn current(&self, now: Instant) -> Option<&str> {
        if self.is_active(now) {
            self.message.as_ref().map(|m| m.text.as_str())
        } else {
            None
        }
    }

    pub fn message(&self) -> Option<&FeedbackMessage> {
        self.message.as_ref()
    }

    pub fn clear(&mut self) {
        self.message = None;
    }
}

/// Feedback shared between the frame loop and the voice listener
pub type SharedFeedback = Arc<Mutex<FeedbackChannel>>;

pub fn new_shared(duration: Duration) -> SharedFeedback {
    Arc::new(Mutex::new(FeedbackChannel::new(duration)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry() {
        let mut channel = FeedbackChannel::new(Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(!channel.is_active(t0));

        channel.set("Night vision enabled", t0);
        assert!(channel.is_active(t0));
        assert!(channel.is_active(t0 + Duration::from_millis(2999)));
        assert!(!channel.is_active(t0 + Duration::from_secs(3)));
        assert_eq!(channel.current(t0 + Duration::from_secs(3)), None);
    }

    #[test]
    fn test_overwrite_restarts_timer() {
        let mut channel = FeedbackChannel::new(Duration::from_secs(3));
        let t0 = Instant::now();
        channel.set("first", t0);
        channel.set("second", t0 + Duration::from_secs(2));
        assert_eq!(channel.current(t0 + Duration::from_secs(4)), Some("second"));
    }

    #[test]
    fn test_clear() {
        let mut channel = FeedbackChannel::default();
        let t0 = Instant::now();
        channel.set("hello", t0);
        channel.clear();
        assert!(!channel.is_active(t0));
        assert!(channel.message().is_none());
    }
}
