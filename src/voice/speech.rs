//! Spoken output
//!
//! At most one utterance plays at a time. Starting a new one cancels the
//! previous, and events from cancelled utterances are dropped.

use crate::Result;
use crate::signal::{SpeechEvent, UtteranceId};

/// Speech synthesis engine
///
/// `speak` must return promptly; the engine reports progress as
/// [`SpeechEvent`]s tagged with the utterance id.
pub trait Synthesizer: Send {
    /// Begin speaking `text` as utterance `id`
    ///
    /// # Errors
    ///
    /// Returns error if the utterance cannot be queued
    fn speak(&mut self, id: UtteranceId, text: &str) -> Result<()>;

    /// Cancel utterance `id` if it is still queued or playing
    fn cancel(&mut self, id: UtteranceId);
}

/// Tracks the current utterance for a synthesizer
pub struct SpeechOutput<S> {
    synthesizer: S,
    next_id: u64,
    current: Option<UtteranceId>,
}

impl<S: Synthesizer> SpeechOutput<S> {
    #[must_use]
    pub const fn new(synthesizer: S) -> Self {
        Self {
            synthesizer,
            next_id: 0,
            current: None,
        }
    }

    /// Utterance that is queued or playing
    #[must_use]
    pub const fn current(&self) -> Option<UtteranceId> {
        self.current
    }

    /// Access the underlying synthesizer
    #[must_use]
    pub const fn synthesizer(&self) -> &S {
        &self.synthesizer
    }

    /// Speak `text`, cancelling any previous utterance
    ///
    /// Returns `None` if the synthesizer refused the text; no events will
    /// follow in that case.
    pub fn speak(&mut self, text: &str) -> Option<UtteranceId> {
        self.stop();

        self.next_id += 1;
        let id = UtteranceId(self.next_id);

        match self.synthesizer.speak(id, text) {
            Ok(()) => {
                tracing::debug!(utterance = id.0, chars = text.len(), "utterance queued");
                self.current = Some(id);
                Some(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed to start");
                None
            }
        }
    }

    /// Cancel the current utterance
    ///
    /// Returns true if something was cancelled.
    pub fn stop(&mut self) -> bool {
        let Some(id) = self.current.take() else {
            return false;
        };

        tracing::debug!(utterance = id.0, "cancelling utterance");
        self.synthesizer.cancel(id);
        true
    }

    /// Filter a synthesizer event
    ///
    /// Returns the event if it belongs to the current utterance. End and
    /// failure events clear the current utterance.
    pub fn accept(&mut self, event: SpeechEvent) -> Option<SpeechEvent> {
        if self.current != Some(event.utterance()) {
            tracing::trace!(utterance = event.utterance().0, "dropping stale speech event");
            return None;
        }

        match &event {
            SpeechEvent::Started(_) => {}
            SpeechEvent::Ended(_) => self.current = None,
            SpeechEvent::Failed(_, reason) => {
                tracing::warn!(reason = %reason, "utterance failed");
                self.current = None;
            }
        }

        Some(event)
    }
}
