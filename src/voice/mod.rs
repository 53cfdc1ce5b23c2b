//! Voice processing
//!
//! Recognition lifecycle, wake phrase detection and turn-taking are pure
//! state machines driven by the assistant loop. The hardware pieces
//! (microphone, speaker, speech APIs) sit behind the [`Recognizer`],
//! [`Synthesizer`] and [`WakeCue`] traits.

mod capture;
mod cue;
mod detector;
mod permission;
mod playback;
mod recognition;
mod recognizer;
mod segmenter;
mod speech;
mod stt;
pub(crate) mod timer;
mod tts;
mod turn;

pub use capture::{CAPTURE_RATE, Microphone, encode_wav};
pub use cue::{SilentCue, ToneCue, WakeCue};
pub use detector::{DetectorPhase, TranscriptOutcome, WakeCommandDetector, command_after_wake};
pub use permission::{PermissionStatus, check_microphone};
pub use playback::{PLAYBACK_RATE, Speaker, decode_mp3, tone};
pub use recognition::{RecognitionSession, RecognitionState, Recognizer, Transition};
pub use recognizer::MicRecognizer;
pub use segmenter::{UtteranceSegmenter, rms};
pub use speech::{SpeechOutput, Synthesizer};
pub use stt::{Transcriber, TranscriberConfig};
pub use tts::{ApiSynthesizer, SynthesizerConfig};
pub use turn::TurnCoordinator;
