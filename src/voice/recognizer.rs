//! Continuous microphone recognizer
//!
//! Each recognition session runs on its own thread: open the microphone,
//! segment speech by energy, transcribe each segment, and report the
//! session's accumulated segments after every transcription.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use secrecy::ExposeSecret;

use super::capture::Microphone;
use super::recognition::Recognizer;
use super::segmenter::UtteranceSegmenter;
use super::stt::{Transcriber, TranscriberConfig};
use crate::signal::{RecognizerError, RecognizerEvent, Signal, SignalSender, Transcript};
use crate::{Error, Result};

/// Microphone poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sessions end on their own after this long, like browser recognizers do
const MAX_SESSION: Duration = Duration::from_secs(60);

/// [`Recognizer`] backed by the microphone and a transcription API
pub struct MicRecognizer {
    stt: TranscriberConfig,
    signals: SignalSender,
    session: Option<Worker>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl MicRecognizer {
    /// Create a recognizer reporting to `signals`
    ///
    /// # Errors
    ///
    /// Returns error if the transcription API key is missing; without it every
    /// session would fail and restart forever.
    pub fn new(stt: TranscriberConfig, signals: SignalSender) -> Result<Self> {
        if stt.api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "OPENAI_API_KEY is required for speech recognition".to_string(),
            ));
        }

        Ok(Self {
            stt,
            signals,
            session: None,
        })
    }
}

impl Recognizer for MicRecognizer {
    fn start(&mut self) -> Result<()> {
        if let Some(worker) = &self.session
            && !worker.handle.is_finished()
        {
            return Err(Error::Recognizer("recognition already running".to_string()));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            let stt = self.stt.clone();
            let signals = self.signals.clone();
            std::thread::Builder::new()
                .name("recognizer".to_string())
                .spawn(move || run_session(&stt, &signals, &stop))?
        };

        self.session = Some(Worker { stop, handle });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(worker) = &self.session {
            worker.stop.store(true, Ordering::Relaxed);
        }
        Ok(())
    }
}

impl Drop for MicRecognizer {
    fn drop(&mut self) {
        if let Some(worker) = self.session.take() {
            worker.stop.store(true, Ordering::Relaxed);
        }
    }
}

fn emit(signals: &SignalSender, event: RecognizerEvent) {
    // The assistant may already be gone during shutdown
    let _ = signals.send(Signal::Recognizer(event));
}

/// A missing microphone disables recognition instead of restarting forever
fn capture_error(error: Error) -> RecognizerError {
    match error {
        Error::DeviceUnavailable(_) => RecognizerError::NotAllowed,
        other => RecognizerError::AudioCapture(other.to_string()),
    }
}

/// One recognition session; always ends with `Ended`
fn run_session(stt: &TranscriberConfig, signals: &SignalSender, stop: &AtomicBool) {
    if let Err(error) = capture_and_transcribe(stt, signals, stop) {
        tracing::warn!(error = ?error, "recognition session failed");
        emit(signals, RecognizerEvent::Error(error));
    }
    emit(signals, RecognizerEvent::Ended);
}

fn capture_and_transcribe(
    stt: &TranscriberConfig,
    signals: &SignalSender,
    stop: &AtomicBool,
) -> std::result::Result<(), RecognizerError> {
    let transcriber =
        Transcriber::new(stt).map_err(|e| RecognizerError::Network(e.to_string()))?;

    let mut mic = Microphone::open().map_err(capture_error)?;
    mic.start().map_err(capture_error)?;

    emit(signals, RecognizerEvent::Started);
    tracing::debug!("recognition session started");

    let mut segmenter = UtteranceSegmenter::new();
    let mut segments: Vec<String> = Vec::new();
    let began = Instant::now();

    let publish = |audio: Vec<f32>, segments: &mut Vec<String>| {
        let text = transcriber
            .transcribe(&audio)
            .map_err(|e| RecognizerError::Network(e.to_string()))?;

        if !text.is_empty() {
            // Segments are concatenated downstream
            if segments.is_empty() {
                segments.push(text);
            } else {
                segments.push(format!(" {text}"));
            }
            emit(
                signals,
                RecognizerEvent::Result(Transcript {
                    segments: segments.clone(),
                    is_final: true,
                }),
            );
        }
        Ok::<(), RecognizerError>(())
    };

    while !stop.load(Ordering::Relaxed) && began.elapsed() < MAX_SESSION {
        std::thread::sleep(POLL_INTERVAL);

        if let Some(audio) = segmenter.push(&mic.drain()) {
            publish(audio, &mut segments)?;
        }
    }

    // Speech cut off by a stop still counts
    if let Some(audio) = segmenter.push(&mic.drain()).or_else(|| segmenter.flush()) {
        publish(audio, &mut segments)?;
    }

    mic.stop();
    tracing::debug!(segments = segments.len(), "recognition session ended");
    Ok(())
}
