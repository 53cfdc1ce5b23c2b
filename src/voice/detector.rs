//! Wake phrase and command detection over live transcripts
//!
//! The detector has two phases. While listening for the wake phrase, every
//! transcript update is searched for it. Once found, the detector captures
//! the command that follows and finalizes it after a quiet interval.

use std::time::Duration;

use crate::signal::{SignalSender, TimerFired, TimerKind, Transcript};
use crate::voice::timer::TimerSlot;

/// Detector phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    /// Waiting for the wake phrase
    ListeningForWake,
    /// Wake phrase heard, accumulating the command
    CapturingCommand,
}

/// Result of feeding one transcript update to the detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptOutcome {
    /// Dropped because the assistant is speaking, or blank during capture
    Ignored,
    /// No wake phrase in the transcript
    NoWake,
    /// Wake phrase detected; capture has begun
    Woke {
        /// Command text that followed the wake phrase in the same transcript
        initial_command: String,
    },
    /// Command text replaced and silence timer re-armed
    Captured,
}

/// State of a single wake-to-command capture
#[derive(Debug, Default)]
struct WakeSession {
    command: String,
    armed: bool,
}

/// Detects the wake phrase and captures the following command
pub struct WakeCommandDetector {
    wake_phrase: String,
    session: Option<WakeSession>,
    silence: TimerSlot,
    silence_after: Duration,
}

impl WakeCommandDetector {
    /// Create a detector for `wake_phrase`
    ///
    /// The phrase is matched case-insensitively.
    #[must_use]
    pub fn new(wake_phrase: &str, silence_after: Duration, signals: &SignalSender) -> Self {
        let (wake_phrase, _) = fold_case(wake_phrase.trim());
        tracing::debug!(wake_phrase = %wake_phrase, "wake detector initialized");

        Self {
            wake_phrase,
            session: None,
            silence: TimerSlot::new(TimerKind::Silence, signals.clone()),
            silence_after,
        }
    }

    /// Normalized wake phrase
    #[must_use]
    pub fn wake_phrase(&self) -> &str {
        &self.wake_phrase
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> DetectorPhase {
        if self.session.is_some() {
            DetectorPhase::CapturingCommand
        } else {
            DetectorPhase::ListeningForWake
        }
    }

    /// Whether the wake phrase has been heard and capture is active
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.armed)
    }

    /// Command text captured so far
    #[must_use]
    pub fn command(&self) -> &str {
        self.session.as_ref().map_or("", |s| s.command.as_str())
    }

    /// Whether the silence timer is pending
    #[must_use]
    pub const fn silence_pending(&self) -> bool {
        self.silence.is_armed()
    }

    /// Feed a transcript update
    ///
    /// While `speaking` is true the update is discarded without touching any state.
    pub fn on_transcript(&mut self, transcript: &Transcript, speaking: bool) -> TranscriptOutcome {
        if speaking {
            tracing::trace!("ignoring transcript while speaking");
            return TranscriptOutcome::Ignored;
        }

        let text = transcript.text();

        match self.session.as_mut() {
            None => {
                let Some(initial_command) = command_after_wake(&text, &self.wake_phrase) else {
                    tracing::trace!(transcript = %text, "no wake phrase");
                    return TranscriptOutcome::NoWake;
                };

                tracing::info!(transcript = %text, "wake phrase detected");
                if !initial_command.is_empty() {
                    tracing::debug!(command = %initial_command, "initial command captured");
                }

                self.session = Some(WakeSession {
                    command: initial_command.clone(),
                    armed: true,
                });
                self.silence.arm(self.silence_after);

                TranscriptOutcome::Woke { initial_command }
            }
            Some(session) => {
                // A flush of the waking utterance may still carry the phrase
                let command = command_after_wake(&text, &self.wake_phrase)
                    .unwrap_or_else(|| text.trim().to_string());

                if command.is_empty() {
                    return TranscriptOutcome::Ignored;
                }

                tracing::debug!(command = %command, "command being captured");
                session.command = command;
                self.silence.arm(self.silence_after);

                TranscriptOutcome::Captured
            }
        }
    }

    /// Handle a silence timer expiry
    ///
    /// Returns the finalized command, if the expiry is current and the
    /// captured text is not blank.
    pub fn on_timer(&mut self, fired: TimerFired) -> Option<String> {
        if !self.silence.accept(fired) {
            return None;
        }

        tracing::debug!(command = self.command(), "silence timeout");
        self.finalize()
    }

    /// Finalize the capture now
    ///
    /// Returns the trimmed command if non-empty. The wake session is cleared
    /// either way.
    pub fn finalize(&mut self) -> Option<String> {
        self.silence.cancel();

        let command = self.session.take()?.command.trim().to_string();
        if command.is_empty() {
            tracing::debug!("wake phrase without command, back to listening");
            return None;
        }

        tracing::info!(command = %command, "command complete");
        Some(command)
    }

    /// Drop any capture in progress
    pub fn reset(&mut self) {
        self.silence.cancel();
        self.session = None;
    }
}

/// Text following the last occurrence of `wake_phrase` in `transcript`
///
/// `wake_phrase` must already be lowercase. Returns `None` when the phrase is
/// absent. Leading punctuation left over from the phrase is stripped.
#[must_use]
pub fn command_after_wake(transcript: &str, wake_phrase: &str) -> Option<String> {
    if wake_phrase.is_empty() {
        return None;
    }

    let (lower, offsets) = fold_case(transcript);
    let end = lower.rfind(wake_phrase)? + wake_phrase.len();
    let tail = &transcript[offsets[end]..];

    Some(
        tail.trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.')
            .trim()
            .to_string(),
    )
}

/// Lowercase `text` char by char, mapping each byte offset of the result
/// back to a char boundary in `text`
///
/// The map has one extra entry for the end of the string. An offset that
/// lands inside the expansion of a single char maps to the end of that char.
fn fold_case(text: &str) -> (String, Vec<usize>) {
    let mut lower = String::with_capacity(text.len());
    let mut offsets = Vec::with_capacity(text.len() + 1);

    for (start, c) in text.char_indices() {
        let end = start + c.len_utf8();
        let before = lower.len();
        lower.extend(c.to_lowercase());

        offsets.push(start);
        offsets.resize(offsets.len() + lower.len() - before - 1, end);
    }
    offsets.push(text.len());

    (lower, offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{self, Signal};

    fn detector() -> (WakeCommandDetector, signal::SignalReceiver) {
        let (tx, rx) = signal::channel();
        let detector = WakeCommandDetector::new("Hello World", Duration::from_secs(2), &tx);
        (detector, rx)
    }

    #[test]
    fn extracts_command_after_last_occurrence() {
        assert_eq!(
            command_after_wake("Hello world, turn off the lights", "hello world").as_deref(),
            Some("turn off the lights")
        );
        assert_eq!(
            command_after_wake("hello world hello world what time is it", "hello world").as_deref(),
            Some("what time is it")
        );
        assert_eq!(command_after_wake("Hello World", "hello world").as_deref(), Some(""));
        assert_eq!(command_after_wake("good morning", "hello world"), None);
    }

    #[test]
    fn extraction_survives_length_changing_case() {
        // 'İ' lowercases to two chars, shifting byte offsets
        let command = command_after_wake("İ hello world play jazz", "hello world");
        assert_eq!(command.as_deref(), Some("play jazz"));
    }

    #[test]
    fn extraction_keeps_original_text_when_lengths_cancel_out() {
        // Kelvin sign shrinks by two bytes and each 'İ' grows by one, so the
        // lowercased text is as long as the original yet shifted
        let transcript = "\u{212A} hello world, İİ go";
        assert_eq!(transcript.len(), transcript.to_lowercase().len());

        let command = command_after_wake(transcript, "hello world");
        assert_eq!(command.as_deref(), Some("İİ go"));
    }

    #[test]
    fn case_folding_maps_back_to_char_boundaries() {
        let (lower, offsets) = fold_case("AİB");
        assert_eq!(lower, "ai\u{307}b");
        assert_eq!(offsets, vec![0, 1, 3, 3, 3, 4]);
    }

    #[tokio::test]
    async fn wake_phrase_is_normalized() {
        let (detector, _rx) = detector();
        assert_eq!(detector.wake_phrase(), "hello world");
        assert_eq!(detector.phase(), DetectorPhase::ListeningForWake);
    }

    #[tokio::test]
    async fn wake_and_command_in_one_event() {
        let (mut detector, _rx) = detector();

        let outcome =
            detector.on_transcript(&Transcript::single("hello world turn off the lights", false), false);

        assert_eq!(
            outcome,
            TranscriptOutcome::Woke {
                initial_command: "turn off the lights".to_string()
            }
        );
        assert_eq!(detector.phase(), DetectorPhase::CapturingCommand);
        assert!(detector.is_armed());
        assert_eq!(detector.command(), "turn off the lights");
        assert!(detector.silence_pending());
    }

    #[tokio::test]
    async fn capture_replaces_rather_than_appends() {
        let (mut detector, _rx) = detector();
        detector.on_transcript(&Transcript::single("hello world", true), false);

        detector.on_transcript(&Transcript::single("what is", false), false);
        detector.on_transcript(&Transcript::single("what is the weather", false), false);

        assert_eq!(detector.command(), "what is the weather");
    }

    #[tokio::test]
    async fn blank_update_keeps_capture() {
        let (mut detector, _rx) = detector();
        detector.on_transcript(&Transcript::single("hello world play music", true), false);

        let outcome = detector.on_transcript(&Transcript::single("   ", false), false);
        assert_eq!(outcome, TranscriptOutcome::Ignored);
        assert_eq!(detector.command(), "play music");
    }

    #[tokio::test]
    async fn transcripts_ignored_while_speaking() {
        let (mut detector, _rx) = detector();

        let outcome = detector.on_transcript(&Transcript::single("hello world stop", true), true);
        assert_eq!(outcome, TranscriptOutcome::Ignored);
        assert_eq!(detector.phase(), DetectorPhase::ListeningForWake);
        assert!(!detector.silence_pending());

        detector.on_transcript(&Transcript::single("hello world stop", true), false);
        let outcome = detector.on_transcript(&Transcript::single("something else", true), true);
        assert_eq!(outcome, TranscriptOutcome::Ignored);
        assert_eq!(detector.command(), "stop");
    }

    #[tokio::test(start_paused = true)]
    async fn silence_finalizes_once() {
        let (mut detector, mut rx) = detector();
        detector.on_transcript(&Transcript::single("hello world", true), false);
        detector.on_transcript(&Transcript::single("turn off the lights", true), false);

        let Some(Signal::Timer(fired)) = rx.recv().await else {
            panic!("expected silence timer");
        };

        assert_eq!(detector.on_timer(fired).as_deref(), Some("turn off the lights"));
        assert!(!detector.is_armed());
        assert_eq!(detector.command(), "");
        assert_eq!(detector.phase(), DetectorPhase::ListeningForWake);

        // The same expiry cannot finalize twice
        assert_eq!(detector.on_timer(fired), None);
    }

    #[tokio::test(start_paused = true)]
    async fn each_update_restarts_the_silence_timer() {
        let (mut detector, mut rx) = detector();
        detector.on_transcript(&Transcript::single("hello world turn", false), false);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        detector.on_transcript(&Transcript::single("turn on the fan", false), false);

        // The first timer was superseded before it could fire
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(rx.try_recv().is_err());

        let Some(Signal::Timer(fired)) = rx.recv().await else {
            panic!("expected silence timer");
        };
        assert_eq!(detector.on_timer(fired).as_deref(), Some("turn on the fan"));
    }

    #[tokio::test(start_paused = true)]
    async fn bare_wake_phrase_times_out_silently() {
        let (mut detector, mut rx) = detector();
        let outcome = detector.on_transcript(&Transcript::single("Hello world.", true), false);
        assert_eq!(
            outcome,
            TranscriptOutcome::Woke {
                initial_command: String::new()
            }
        );

        let Some(Signal::Timer(fired)) = rx.recv().await else {
            panic!("expected silence timer");
        };
        assert_eq!(detector.on_timer(fired), None);
        assert_eq!(detector.phase(), DetectorPhase::ListeningForWake);
    }

    #[tokio::test]
    async fn explicit_finalize() {
        let (mut detector, _rx) = detector();
        detector.on_transcript(&Transcript::single("hello world open the door", true), false);

        assert_eq!(detector.finalize().as_deref(), Some("open the door"));
        assert!(!detector.silence_pending());
        assert_eq!(detector.finalize(), None);
    }

    #[tokio::test]
    async fn no_wake_no_command() {
        let (mut detector, _rx) = detector();
        for text in ["good morning", "turn off the lights", "hello", "world"] {
            assert_eq!(
                detector.on_transcript(&Transcript::single(text, true), false),
                TranscriptOutcome::NoWake
            );
        }
        assert_eq!(detector.finalize(), None);
    }

    #[tokio::test]
    async fn wake_phrase_split_across_segments() {
        let (mut detector, _rx) = detector();
        let transcript = Transcript {
            segments: vec!["hello ".to_string(), "world dim the lights".to_string()],
            is_final: false,
        };

        assert!(matches!(
            detector.on_transcript(&transcript, false),
            TranscriptOutcome::Woke { .. }
        ));
        assert_eq!(detector.command(), "dim the lights");
    }
}
