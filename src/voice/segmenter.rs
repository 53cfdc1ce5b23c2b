//! Energy-based utterance segmentation
//!
//! Splits a live sample stream into speech segments worth transcribing.
//! Quiet audio never reaches the transcription API.

/// RMS energy above which a chunk counts as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum segment length to transcribe (0.3s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that closes a segment (0.5s at 16kHz)
const SILENCE_SAMPLES: usize = 8000;

/// Upper bound on a single segment (15s at 16kHz)
const MAX_SEGMENT_SAMPLES: usize = 240_000;

/// Splits audio chunks into utterance segments
#[derive(Debug, Default)]
pub struct UtteranceSegmenter {
    segment: Vec<f32>,
    in_speech: bool,
    silence: usize,
}

impl UtteranceSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of samples
    ///
    /// Returns a completed segment once speech is followed by enough silence.
    pub fn push(&mut self, chunk: &[f32]) -> Option<Vec<f32>> {
        if chunk.is_empty() {
            return None;
        }

        let energy = rms(chunk);
        let is_speech = energy > ENERGY_THRESHOLD;

        if !self.in_speech {
            if is_speech {
                tracing::trace!(energy, "speech onset");
                self.in_speech = true;
                self.silence = 0;
                self.segment.clear();
                self.segment.extend_from_slice(chunk);
            }
            return None;
        }

        self.segment.extend_from_slice(chunk);
        if is_speech {
            self.silence = 0;
        } else {
            self.silence += chunk.len();
        }

        if self.segment.len() >= MAX_SEGMENT_SAMPLES {
            tracing::debug!("segment hit length cap");
            return self.take();
        }

        if self.silence > SILENCE_SAMPLES {
            if self.segment.len() > MIN_SPEECH_SAMPLES + self.silence {
                return self.take();
            }
            // Too short to be speech, likely a click
            self.reset();
        }

        None
    }

    /// Flush whatever speech is buffered
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        if self.in_speech && self.segment.len() > MIN_SPEECH_SAMPLES {
            return self.take();
        }
        self.reset();
        None
    }

    /// Whether a segment is in progress
    #[must_use]
    pub const fn in_speech(&self) -> bool {
        self.in_speech
    }

    pub fn reset(&mut self) {
        self.segment.clear();
        self.in_speech = false;
        self.silence = 0;
    }

    fn take(&mut self) -> Option<Vec<f32>> {
        let segment = std::mem::take(&mut self.segment);
        tracing::debug!(samples = segment.len(), "speech segment complete");
        self.reset();
        Some(segment)
    }
}

/// RMS energy of a chunk
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
