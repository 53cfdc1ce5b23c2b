//! Signals routed through the assistant event loop
//!
//! Every asynchronous source (recognizer callbacks, synthesizer lifecycle,
//! timers, response streams) reports back through a single channel, so the
//! assistant handles one signal at a time and ordering is explicit.

use tokio::sync::mpsc;

use crate::voice::PermissionStatus;

/// Sending half of the assistant signal channel
pub type SignalSender = mpsc::UnboundedSender<Signal>;

/// Receiving half of the assistant signal channel
pub type SignalReceiver = mpsc::UnboundedReceiver<Signal>;

/// Create a new signal channel
#[must_use]
pub fn channel() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}

/// A message delivered to the assistant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Microphone permission check finished
    Permission(PermissionStatus),
    /// Speech recognizer lifecycle or result
    Recognizer(RecognizerEvent),
    /// Speech synthesizer lifecycle
    Speech(SpeechEvent),
    /// A scheduled timer elapsed
    Timer(TimerFired),
    /// A response stream finished (done, failed or cut short)
    StreamDone {
        /// Turn number the stream was started for
        turn: u64,
    },
    /// Finalize the command being captured without waiting for silence
    Finalize,
    /// Stop the event loop
    Shutdown,
}

/// Events emitted by a speech recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Recognition is live
    Started,
    /// Incremental result for the current recognition session
    Result(Transcript),
    /// Recognition ended (intentionally or not)
    Ended,
    /// Recognition failed
    Error(RecognizerError),
}

/// Incremental recognition result
///
/// Continuous recognizers resend every segment of the session on each
/// update, so the full utterance so far is the concatenation of `segments`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    /// All result segments of the current recognition session
    pub segments: Vec<String>,
    /// Whether the last segment is final
    pub is_final: bool,
}

impl Transcript {
    /// Build a transcript from a single segment
    #[must_use]
    pub fn single(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            segments: vec![text.into()],
            is_final,
        }
    }

    /// Full transcript text across all segments
    #[must_use]
    pub fn text(&self) -> String {
        self.segments.concat()
    }
}

/// Recognizer failure categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerError {
    /// Microphone access refused; terminal
    NotAllowed,
    /// Cancelled by an intentional stop
    Aborted,
    /// No speech heard before the recognizer gave up
    NoSpeech,
    /// Audio device failure
    AudioCapture(String),
    /// Transcription backend unreachable or failing
    Network(String),
}

impl std::fmt::Display for RecognizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::Aborted => write!(f, "aborted"),
            Self::NoSpeech => write!(f, "no-speech"),
            Self::AudioCapture(msg) => write!(f, "audio-capture: {msg}"),
            Self::Network(msg) => write!(f, "network: {msg}"),
        }
    }
}

/// Identifier of a single synthesized utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtteranceId(pub u64);

/// Events emitted by a speech synthesizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Output audio began
    Started(UtteranceId),
    /// Output audio finished
    Ended(UtteranceId),
    /// Synthesis or playback failed
    Failed(UtteranceId, String),
}

impl SpeechEvent {
    /// Utterance this event belongs to
    #[must_use]
    pub const fn utterance(&self) -> UtteranceId {
        match self {
            Self::Started(id) | Self::Ended(id) | Self::Failed(id, _) => *id,
        }
    }
}

/// Which timer slot an expiry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Recognizer restart after end or error
    Restart,
    /// Delayed recognizer stop after a wake detection
    Stop,
    /// Command silence finalization
    Silence,
    /// Recognizer restart after the assistant finished speaking
    SpeechRestart,
}

/// Expiry of an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    /// Slot the timer was armed on
    pub kind: TimerKind,
    /// Arm generation; stale generations are ignored
    pub generation: u64,
}
