//! Recognition session lifecycle
//!
//! Wraps a continuous speech recognizer in an explicit state machine so that
//! overlapping start/stop requests never reach the recognizer.

use crate::config::Timings;
use crate::signal::{RecognizerError, SignalSender, TimerFired, TimerKind};
use crate::voice::PermissionStatus;
use crate::voice::timer::TimerSlot;
use crate::Result;

/// A continuous speech recognizer
///
/// Implementations report lifecycle events and results asynchronously as
/// [`crate::signal::RecognizerEvent`]s on the signal channel they were built with.
pub trait Recognizer: Send {
    /// Begin a recognition session
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer refuses to start
    fn start(&mut self) -> Result<()>;

    /// End the current recognition session, flushing pending results
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer refuses to stop
    fn stop(&mut self) -> Result<()>;
}

/// Recognition session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognitionState {
    /// No recognition session
    #[default]
    Idle,
    /// Start issued, waiting for the recognizer to confirm
    Starting,
    /// Recognizer is live
    Running,
    /// Stop issued, waiting for the recognizer to end
    Stopping,
}

/// Inputs to the recognition state table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Issue a start
    Start,
    /// Recognizer confirmed start
    Started,
    /// Issue a stop
    Stop,
    /// Recognizer ended or failed
    Ended,
}

impl RecognitionState {
    /// Apply a transition, returning `None` when it is not allowed
    #[must_use]
    pub const fn apply(self, transition: Transition) -> Option<Self> {
        match (self, transition) {
            (Self::Idle, Transition::Start) => Some(Self::Starting),
            (Self::Starting, Transition::Started) => Some(Self::Running),
            (Self::Running, Transition::Stop) => Some(Self::Stopping),
            (_, Transition::Ended) => Some(Self::Idle),
            _ => None,
        }
    }
}

/// Owns the recognizer and its lifecycle state
pub struct RecognitionSession<R> {
    recognizer: R,
    state: RecognitionState,
    permission: PermissionStatus,
    restart: TimerSlot,
    stop: TimerSlot,
    timings: Timings,
}

impl<R: Recognizer> RecognitionSession<R> {
    /// Create an idle session; permission starts as `Checking`
    #[must_use]
    pub fn new(recognizer: R, signals: &SignalSender, timings: Timings) -> Self {
        Self {
            recognizer,
            state: RecognitionState::Idle,
            permission: PermissionStatus::Checking,
            restart: TimerSlot::new(TimerKind::Restart, signals.clone()),
            stop: TimerSlot::new(TimerKind::Stop, signals.clone()),
            timings,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> RecognitionState {
        self.state
    }

    /// Current microphone permission
    #[must_use]
    pub const fn permission(&self) -> PermissionStatus {
        self.permission
    }

    /// Whether a restart is scheduled
    #[must_use]
    pub const fn restart_pending(&self) -> bool {
        self.restart.is_armed()
    }

    /// The wrapped recognizer
    #[must_use]
    pub const fn recognizer(&self) -> &R {
        &self.recognizer
    }

    /// Record the microphone permission
    ///
    /// Anything other than `Granted` cancels a pending restart.
    pub fn set_permission(&mut self, status: PermissionStatus) {
        if self.permission != status {
            tracing::debug!(from = ?self.permission, to = ?status, "permission changed");
        }
        self.permission = status;

        if !status.is_granted() {
            self.restart.cancel();
        }
    }

    /// Start recognition if idle, permitted and not speaking
    ///
    /// Returns true if a start was issued.
    pub fn request_start(&mut self, speaking: bool) -> bool {
        if self.state != RecognitionState::Idle || !self.permission.is_granted() || speaking {
            tracing::debug!(
                state = ?self.state,
                permission = ?self.permission,
                speaking,
                "recognition not started"
            );
            return false;
        }

        self.restart.cancel();
        self.transition(Transition::Start);

        match self.recognizer.start() {
            Ok(()) => {
                tracing::debug!("recognition start requested");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start recognition");
                self.state = RecognitionState::Idle;
                false
            }
        }
    }

    /// Stop recognition if running
    ///
    /// Returns true if a stop was issued.
    pub fn request_stop(&mut self) -> bool {
        self.stop.cancel();

        if self.state != RecognitionState::Running {
            tracing::debug!(state = ?self.state, "recognition not stopped");
            return false;
        }

        self.transition(Transition::Stop);

        match self.recognizer.stop() {
            Ok(()) => {
                tracing::debug!("recognition stop requested");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to stop recognition");
                self.state = RecognitionState::Idle;
                false
            }
        }
    }

    /// Stop recognition after the wake-stop delay
    pub fn schedule_stop(&mut self) {
        self.stop.arm(self.timings.wake_stop);
    }

    /// Recognizer confirmed start
    pub fn on_started(&mut self) {
        self.transition(Transition::Started);
        tracing::info!("speech recognition started");
    }

    /// Recognizer ended
    pub fn on_ended(&mut self, speaking: bool) {
        self.transition(Transition::Ended);
        self.stop.cancel();
        tracing::info!("speech recognition ended");

        if self.permission.is_granted() && !speaking {
            self.restart.arm(self.timings.end_restart);
        }
    }

    /// Recognizer failed
    pub fn on_error(&mut self, error: &RecognizerError, speaking: bool) {
        self.transition(Transition::Ended);
        self.stop.cancel();

        match error {
            RecognizerError::NotAllowed => {
                tracing::error!(
                    "microphone access denied - enable microphone permissions and restart"
                );
                self.set_permission(PermissionStatus::Denied);
            }
            RecognizerError::Aborted => {
                tracing::debug!("recognition aborted");
            }
            other => {
                tracing::warn!(error = %other, "speech recognition error");
                if self.permission.is_granted() && !speaking {
                    self.restart.arm(self.timings.error_restart);
                }
            }
        }
    }

    /// Handle a restart or stop timer expiry
    ///
    /// Returns true if the expiry belonged to this session.
    pub fn on_timer(&mut self, fired: TimerFired, speaking: bool) -> bool {
        match fired.kind {
            TimerKind::Restart if self.restart.accept(fired) => {
                self.request_start(speaking);
                true
            }
            TimerKind::Stop if self.stop.accept(fired) => {
                self.request_stop();
                true
            }
            _ => false,
        }
    }

    /// Cancel timers and stop a live recognizer
    pub fn shutdown(&mut self) {
        self.restart.cancel();
        self.stop.cancel();

        if matches!(
            self.state,
            RecognitionState::Starting | RecognitionState::Running
        ) {
            if let Err(e) = self.recognizer.stop() {
                tracing::warn!(error = %e, "failed to stop recognition during shutdown");
            }
        }
        self.state = RecognitionState::Idle;
    }

    fn transition(&mut self, transition: Transition) {
        match self.state.apply(transition) {
            Some(next) => self.state = next,
            None => tracing::warn!(
                state = ?self.state,
                ?transition,
                "ignoring illegal recognition transition"
            ),
        }
    }
}
