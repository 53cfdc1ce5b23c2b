//! Turn-taking between listening and speaking
//!
//! The coordinator owns the speaking flag. Recognition must never run while
//! output audio plays, otherwise the assistant hears itself.

use std::time::Duration;

use crate::signal::{SignalSender, TimerFired, TimerKind};
use crate::voice::recognition::{RecognitionSession, RecognitionState, Recognizer};
use crate::voice::timer::TimerSlot;

/// Gates recognition on the assistant's own speech
pub struct TurnCoordinator {
    speaking: bool,
    restart: TimerSlot,
    restart_delay: Duration,
}

impl TurnCoordinator {
    /// Create a coordinator that restarts recognition `restart_delay` after speech ends
    #[must_use]
    pub fn new(restart_delay: Duration, signals: &SignalSender) -> Self {
        Self {
            speaking: false,
            restart: TimerSlot::new(TimerKind::SpeechRestart, signals.clone()),
            restart_delay,
        }
    }

    /// Whether output audio is playing
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Whether a post-speech restart is scheduled
    #[must_use]
    pub const fn restart_pending(&self) -> bool {
        self.restart.is_armed()
    }

    /// Output audio began
    pub fn on_speech_start<R: Recognizer>(&mut self, session: &mut RecognitionSession<R>) {
        tracing::debug!("speaking started, suspending recognition");
        self.speaking = true;
        self.restart.cancel();
        session.request_stop();
    }

    /// Output audio ended, was stopped, or failed
    pub fn on_speech_end<R: Recognizer>(&mut self, session: &RecognitionSession<R>) {
        tracing::debug!("speaking finished");
        self.speaking = false;

        if session.permission().is_granted() && session.state() == RecognitionState::Idle {
            self.restart.arm(self.restart_delay);
        }
    }

    /// Recognizer confirmed start
    ///
    /// A start that raced with speech is stopped immediately.
    pub fn on_recognizer_started<R: Recognizer>(&self, session: &mut RecognitionSession<R>) {
        session.on_started();

        if self.speaking {
            tracing::debug!("recognition started while speaking, stopping");
            session.request_stop();
        }
    }

    /// Handle a post-speech restart expiry
    ///
    /// Returns true if the expiry belonged to this coordinator.
    pub fn on_timer<R: Recognizer>(
        &mut self,
        fired: TimerFired,
        session: &mut RecognitionSession<R>,
    ) -> bool {
        if !self.restart.accept(fired) {
            return false;
        }

        tracing::debug!("restarting recognition after speech");
        session.request_start(self.speaking);
        true
    }

    /// Cancel a pending restart
    pub fn shutdown(&mut self) {
        self.restart.cancel();
    }
}
