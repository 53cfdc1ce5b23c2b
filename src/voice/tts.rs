//! Text-to-speech through an `/audio/speech` compatible API

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use secrecy::{ExposeSecret, SecretString};

use super::playback::{Speaker, decode_mp3};
use super::speech::Synthesizer;
use crate::signal::{Signal, SignalSender, SpeechEvent, UtteranceId};
use crate::{Error, Result};

/// Synthesis endpoint settings
#[derive(Clone)]
pub struct SynthesizerConfig {
    /// API base URL (e.g. `https://api.openai.com/v1`)
    pub api_url: String,
    /// Bearer token
    pub api_key: SecretString,
    /// Model identifier (e.g. `tts-1`)
    pub model: String,
    /// Voice identifier (e.g. `alloy`)
    pub voice: String,
    /// Speed multiplier
    pub speed: f64,
}

#[derive(serde::Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f64,
    response_format: &'a str,
}

/// [`Synthesizer`] that fetches MP3 audio and plays it on the speaker
///
/// Each utterance gets its own thread; cancellation flips a flag the
/// playback loop polls.
pub struct ApiSynthesizer {
    config: Arc<SynthesizerConfig>,
    signals: SignalSender,
    active: HashMap<UtteranceId, Arc<AtomicBool>>,
}

impl ApiSynthesizer {
    /// Create a synthesizer reporting to `signals`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(config: SynthesizerConfig, signals: SignalSender) -> Result<Self> {
        if config.api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "OPENAI_API_KEY is required for speech synthesis".to_string(),
            ));
        }

        Ok(Self {
            config: Arc::new(config),
            signals,
            active: HashMap::new(),
        })
    }
}

impl Synthesizer for ApiSynthesizer {
    fn speak(&mut self, id: UtteranceId, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::Tts("nothing to say".to_string()));
        }

        self.active.retain(|_, cancel| !cancel.load(Ordering::Relaxed));

        let cancel = Arc::new(AtomicBool::new(false));
        self.active.insert(id, Arc::clone(&cancel));

        let config = Arc::clone(&self.config);
        let signals = self.signals.clone();
        let text = text.to_string();

        std::thread::Builder::new()
            .name("synthesizer".to_string())
            .spawn(move || {
                let event = match speak_blocking(&config, &text, &signals, id, &cancel) {
                    Ok(()) => SpeechEvent::Ended(id),
                    Err(e) => SpeechEvent::Failed(id, e.to_string()),
                };
                cancel.store(true, Ordering::Relaxed);
                let _ = signals.send(Signal::Speech(event));
            })?;

        Ok(())
    }

    fn cancel(&mut self, id: UtteranceId) {
        if let Some(cancel) = self.active.remove(&id) {
            cancel.store(true, Ordering::Relaxed);
        }
    }
}

/// Fetch, decode and play one utterance
fn speak_blocking(
    config: &SynthesizerConfig,
    text: &str,
    signals: &SignalSender,
    id: UtteranceId,
    cancel: &AtomicBool,
) -> Result<()> {
    let audio = synthesize(config, text)?;
    if cancel.load(Ordering::Relaxed) {
        return Ok(());
    }

    let samples = decode_mp3(&audio)?;
    let speaker = Speaker::open()?;

    let _ = signals.send(Signal::Speech(SpeechEvent::Started(id)));
    speaker.play(samples, cancel)?;
    Ok(())
}

fn synthesize(config: &SynthesizerConfig, text: &str) -> Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let request = SpeechRequest {
        model: &config.model,
        input: text,
        voice: &config.voice,
        speed: config.speed.clamp(0.25, 4.0),
        response_format: "mp3",
    };

    let response = client
        .post(format!("{}/audio/speech", config.api_url.trim_end_matches('/')))
        .bearer_auth(config.api_key.expose_secret())
        .json(&request)
        .send()?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        return Err(Error::Tts(format!("speech API error {status}: {body}")));
    }

    let audio = response.bytes()?;
    tracing::debug!(bytes = audio.len(), "speech synthesized");
    Ok(audio.to_vec())
}
