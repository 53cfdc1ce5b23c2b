//! Voice assistant event loop
//!
//! The assistant owns every component and handles one [`Signal`] at a time:
//! recognizer events feed the wake detector, a finalized command goes to the
//! response consumer, a finished response is spoken, and speech lifecycle
//! events gate recognition through the turn coordinator.

use tokio::sync::watch;

use crate::Result;
use crate::chat::{ResponseConsumer, StreamedResponse};
use crate::config::VoiceConfig;
use crate::signal::{
    RecognizerEvent, Signal, SignalReceiver, SignalSender, SpeechEvent, TimerFired, TimerKind,
};
use crate::voice::{
    DetectorPhase, PermissionStatus, RecognitionSession, RecognitionState, Recognizer, SilentCue,
    SpeechOutput, Synthesizer, TranscriptOutcome, TurnCoordinator, WakeCommandDetector, WakeCue,
};

/// Snapshot of the assistant for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantStatus {
    /// Microphone permission
    pub permission: PermissionStatus,
    /// Recognizer lifecycle state
    pub recognition: RecognitionState,
    /// Whether a command is being captured after the wake phrase
    pub awaiting_command: bool,
    /// Command text captured so far
    pub command: String,
    /// Whether a response is streaming
    pub processing: bool,
    /// Whether the assistant is speaking
    pub speaking: bool,
}

impl Default for AssistantStatus {
    fn default() -> Self {
        Self {
            permission: PermissionStatus::Checking,
            recognition: RecognitionState::Idle,
            awaiting_command: false,
            command: String::new(),
            processing: false,
            speaking: false,
        }
    }
}

impl AssistantStatus {
    /// One-line description for the terminal
    #[must_use]
    pub fn describe(&self, wake_phrase: &str) -> String {
        match self.permission {
            PermissionStatus::Denied => {
                return "Microphone access denied. Enable microphone access and restart."
                    .to_string();
            }
            PermissionStatus::Checking | PermissionStatus::Prompt => {
                return "Checking microphone access...".to_string();
            }
            PermissionStatus::Granted => {}
        }

        if self.speaking {
            "Speaking... (listening blocked)".to_string()
        } else if self.awaiting_command {
            if self.command.is_empty() {
                "Listening... speak your command now".to_string()
            } else {
                format!("Awaiting command: {}", self.command)
            }
        } else if self.processing {
            "Processing...".to_string()
        } else if self.recognition == RecognitionState::Running {
            format!("Listening for \"{wake_phrase}\"...")
        } else {
            "Ready".to_string()
        }
    }
}

/// Wake-phrase voice assistant
pub struct Assistant<R, S> {
    session: RecognitionSession<R>,
    detector: WakeCommandDetector,
    turn: TurnCoordinator,
    output: SpeechOutput<S>,
    responses: ResponseConsumer,
    cue: Box<dyn WakeCue>,
    signals: SignalSender,
    inbox: SignalReceiver,
    status: watch::Sender<AssistantStatus>,
}

impl<R: Recognizer, S: Synthesizer> Assistant<R, S> {
    /// Assemble an assistant
    ///
    /// `recognizer` and `synthesizer` must report to the sending half of
    /// `channel`.
    ///
    /// # Errors
    ///
    /// Returns error if the response consumer cannot be built
    pub fn new(
        config: &VoiceConfig,
        channel: (SignalSender, SignalReceiver),
        recognizer: R,
        synthesizer: S,
    ) -> Result<Self> {
        let (signals, inbox) = channel;
        let timings = config.timings;

        let responses =
            ResponseConsumer::new(&config.backend_url)?.with_notifier(signals.clone());
        let (status, _) = watch::channel(AssistantStatus::default());

        tracing::info!(
            wake_phrase = %config.wake_phrase,
            backend = %config.backend_url,
            "assistant ready"
        );

        Ok(Self {
            session: RecognitionSession::new(recognizer, &signals, timings),
            detector: WakeCommandDetector::new(&config.wake_phrase, timings.silence, &signals),
            turn: TurnCoordinator::new(timings.speech_end_restart, &signals),
            output: SpeechOutput::new(synthesizer),
            responses,
            cue: Box::new(SilentCue),
            signals,
            inbox,
            status,
        })
    }

    /// Play `cue` whenever the wake phrase is heard
    #[must_use]
    pub fn with_cue(mut self, cue: impl WakeCue + 'static) -> Self {
        self.cue = Box::new(cue);
        self
    }

    /// Sender for injecting signals (permission result, finalize, shutdown)
    #[must_use]
    pub fn sender(&self) -> SignalSender {
        self.signals.clone()
    }

    /// Watch the assistant status
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AssistantStatus> {
        self.status.subscribe()
    }

    /// Watch the current response
    #[must_use]
    pub fn subscribe_responses(&self) -> watch::Receiver<StreamedResponse> {
        self.responses.subscribe()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> AssistantStatus {
        self.status.borrow().clone()
    }

    /// The recognition session
    #[must_use]
    pub const fn session(&self) -> &RecognitionSession<R> {
        &self.session
    }

    /// The speech output
    #[must_use]
    pub const fn output(&self) -> &SpeechOutput<S> {
        &self.output
    }

    /// Whether output audio is playing
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.turn.is_speaking()
    }

    /// Current detector phase
    #[must_use]
    pub const fn phase(&self) -> DetectorPhase {
        self.detector.phase()
    }

    /// Process signals until `Shutdown` or every sender is gone
    pub async fn run(&mut self) {
        while self.step().await {}
        self.shutdown();
    }

    /// Wait for and handle one signal
    ///
    /// Returns false once the loop should stop.
    pub async fn step(&mut self) -> bool {
        match self.inbox.recv().await {
            Some(signal) => self.handle(signal),
            None => false,
        }
    }

    /// Handle one signal
    ///
    /// Returns false for `Shutdown`.
    pub fn handle(&mut self, signal: Signal) -> bool {
        tracing::trace!(?signal, "signal");

        let keep_running = match signal {
            Signal::Permission(status) => {
                self.on_permission(status);
                true
            }
            Signal::Recognizer(event) => {
                self.on_recognizer(event);
                true
            }
            Signal::Speech(event) => {
                self.on_speech(event);
                true
            }
            Signal::Timer(fired) => {
                self.on_timer(fired);
                true
            }
            Signal::StreamDone { turn } => {
                self.on_stream_done(turn);
                true
            }
            Signal::Finalize => {
                if let Some(command) = self.detector.finalize() {
                    self.dispatch(&command);
                }
                true
            }
            Signal::Shutdown => false,
        };

        self.publish_status();
        keep_running
    }

    /// Stop recognition and output and cancel every timer
    pub fn shutdown(&mut self) {
        tracing::info!("assistant shutting down");
        self.detector.reset();
        self.turn.shutdown();
        self.output.stop();
        self.session.shutdown();
        self.publish_status();
    }

    fn on_permission(&mut self, status: PermissionStatus) {
        self.session.set_permission(status);

        match status {
            PermissionStatus::Granted => {
                tracing::info!("microphone access granted");
                self.session.request_start(self.turn.is_speaking());
            }
            PermissionStatus::Denied => {
                tracing::error!("microphone access denied, voice input disabled");
            }
            PermissionStatus::Checking | PermissionStatus::Prompt => {}
        }

        self.drop_capture_unless_permitted();
    }

    fn on_recognizer(&mut self, event: RecognizerEvent) {
        let speaking = self.turn.is_speaking();

        match event {
            RecognizerEvent::Started => self.turn.on_recognizer_started(&mut self.session),
            RecognizerEvent::Result(transcript) => {
                if let TranscriptOutcome::Woke { .. } =
                    self.detector.on_transcript(&transcript, speaking)
                {
                    self.cue.play();
                    // Restarting clears the recognizer's transcript buffer
                    self.session.schedule_stop();
                }
            }
            RecognizerEvent::Ended => self.session.on_ended(speaking),
            RecognizerEvent::Error(error) => {
                self.session.on_error(&error, speaking);
                self.drop_capture_unless_permitted();
            }
        }
    }

    /// A command captured before recognition was disabled is never sent
    fn drop_capture_unless_permitted(&mut self) {
        if !self.session.permission().is_granted()
            && self.detector.phase() == DetectorPhase::CapturingCommand
        {
            tracing::info!("recognition disabled, discarding command in progress");
            self.detector.reset();
        }
    }

    fn on_speech(&mut self, event: SpeechEvent) {
        let Some(event) = self.output.accept(event) else {
            return;
        };

        match event {
            SpeechEvent::Started(_) => self.turn.on_speech_start(&mut self.session),
            SpeechEvent::Ended(_) | SpeechEvent::Failed(..) => {
                self.turn.on_speech_end(&self.session);
            }
        }
    }

    fn on_timer(&mut self, fired: TimerFired) {
        let speaking = self.turn.is_speaking();

        match fired.kind {
            TimerKind::Restart | TimerKind::Stop => {
                self.session.on_timer(fired, speaking);
            }
            TimerKind::SpeechRestart => {
                self.turn.on_timer(fired, &mut self.session);
            }
            TimerKind::Silence => {
                if let Some(command) = self.detector.on_timer(fired) {
                    self.dispatch(&command);
                }
            }
        }
    }

    fn on_stream_done(&mut self, turn: u64) {
        if turn != self.responses.current_turn() {
            tracing::debug!(turn, "ignoring superseded response");
            return;
        }

        let response = self.responses.current();
        if let Some(error) = &response.error {
            tracing::warn!(turn, error = %error, "response ended with error");
        }

        let text = response.text.trim();
        if text.is_empty() {
            tracing::debug!(turn, "nothing to say");
            return;
        }

        if self.output.speak(text).is_none() {
            tracing::warn!(turn, "response could not be spoken");
        }
    }

    /// Hand a finalized command to the response consumer
    fn dispatch(&mut self, command: &str) {
        // Any reply still playing belongs to an older turn
        let was_speaking = self.turn.is_speaking();
        self.output.stop();
        if was_speaking {
            self.turn.on_speech_end(&self.session);
        }

        self.responses.send_message(command);
    }

    fn publish_status(&self) {
        let response = self.responses.current();
        let next = AssistantStatus {
            permission: self.session.permission(),
            recognition: self.session.state(),
            awaiting_command: self.detector.phase() == DetectorPhase::CapturingCommand,
            command: self.detector.command().to_string(),
            processing: response.in_flight,
            speaking: self.turn.is_speaking(),
        };

        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}
