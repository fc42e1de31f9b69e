//! Voice command listener
//!
//! Recognized utterances arrive on a channel from whatever speech front end is
//! attached. The listener runs on its own thread, concurrently with the frame
//! loop, and shares the dispatcher and feedback channel with it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::clock::Clock;
use crate::command::CommandDispatcher;
use crate::error::Result;
use crate::feedback::SharedFeedback;
use crate::state::SharedState;
use crate::stats::{Origin, SharedStats, with_stats};

pub struct VoiceListener {
    handle: JoinHandle<()>,
}

impl VoiceListener {
    /// Start listening; the thread exits once every sender has been dropped
    pub fn spawn(
        rx: flume::Receiver<String>,
        dispatcher: Arc<CommandDispatcher>,
        feedback: SharedFeedback,
        clock: Arc<dyn Clock>,
        stats: SharedStats,
        state: SharedState,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("voice".to_string())
            .spawn(move || {
                info!("Voice listener started");
                while let Ok(utterance) = rx.recv() {
                    if !state.is_voice_enabled() {
                        debug!("Voice disabled, ignoring {:?}", utterance);
                        continue;
                    }
                    handle_utterance(&utterance, &dispatcher, &feedback, clock.as_ref(), &stats);
                }
                info!("Voice listener stopped");
            })?;
        Ok(Self { handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) {
        if self.handle.join().is_err() {
            tracing::error!("Voice listener panicked");
        }
    }
}

/// Match and dispatch one utterance; unmatched speech is dropped
pub fn handle_utterance(
    utterance: &str,
    dispatcher: &CommandDispatcher,
    feedback: &SharedFeedback,
    clock: &dyn Clock,
    stats: &SharedStats,
) -> bool {
    match dispatcher.dispatch_phrase(utterance) {
        Some(text) => {
            feedback
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .set(text, clock.now());
            with_stats(stats, |s| s.record_dispatch(Origin::Voice));
            true
        }
        None => {
            with_stats(stats, |s| s.voice_misses += 1);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::command::VoicePhraseTable;
    use crate::config::Config;
    use crate::device::{CannedStubs, MemoryUpdateLog, SimulatedSink};
    use crate::feedback;
    use crate::state::RuntimeState;
    use crate::stats;

    fn dispatcher(sink: Arc<SimulatedSink>) -> Arc<CommandDispatcher> {
        Arc::new(CommandDispatcher::new(
            sink,
            Arc::new(CannedStubs),
            Arc::new(MemoryUpdateLog::default()),
            VoicePhraseTable::default(),
        ))
    }

    #[test]
    fn test_listener_dispatches_and_stops() {
        let sink = Arc::new(SimulatedSink::new());
        let feedback = feedback::new_shared(Config::default().feedback_duration());
        let clock = Arc::new(ManualClock::default());
        let stats = stats::new_shared();
        let (tx, rx) = flume::unbounded();

        let listener = VoiceListener::spawn(
            rx,
            dispatcher(sink.clone()),
            feedback.clone(),
            clock.clone(),
            stats.clone(),
            RuntimeState::new(&Config::default()),
        )
        .unwrap();

        tx.send("please zoom in".to_string()).unwrap();
        tx.send("what a nice day".to_string()).unwrap();
        drop(tx);
        listener.join();

        assert_eq!(sink.sent().len(), 1);
        assert_eq!(sink.sent()[0].to_string(), "ZOOM IN");
        assert_eq!(feedback.lock().unwrap().current(clock.now()), Some("Zoomed in"));
        let s = stats.lock().unwrap();
        assert_eq!(s.voice_dispatches, 1);
        assert_eq!(s.voice_misses, 1);
    }

    #[test]
    fn test_disabled_voice_is_ignored() {
        let sink = Arc::new(SimulatedSink::new());
        let state = RuntimeState::new(&Config::default());
        state.toggle_voice();
        let (tx, rx) = flume::unbounded();
        let listener = VoiceListener::spawn(
            rx,
            dispatcher(sink.clone()),
            feedback::new_shared(Config::default().feedback_duration()),
            Arc::new(ManualClock::default()),
            stats::new_shared(),
            state,
        )
        .unwrap();
        tx.send("zoom in".to_string()).unwrap();
        drop(tx);
        listener.join();
        assert!(sink.sent().is_empty());
    }
}
