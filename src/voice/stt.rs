//! Speech-to-text through a Whisper-compatible transcription API

use secrecy::{ExposeSecret, SecretString};

use super::capture::{CAPTURE_RATE, encode_wav};
use crate::{Error, Result};

/// Response from the transcription endpoint
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcription endpoint settings
#[derive(Clone)]
pub struct TranscriberConfig {
    /// API base URL (e.g. `https://api.openai.com/v1`)
    pub api_url: String,
    /// Bearer token
    pub api_key: SecretString,
    /// Model identifier
    pub model: String,
}

/// Blocking transcription client
///
/// Runs on the recognizer's worker thread, so it uses reqwest's blocking API.
/// Build it on that thread: a blocking client must not be dropped inside the
/// async runtime.
pub struct Transcriber {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
}

impl Transcriber {
    /// Create a transcriber for `{api_url}/audio/transcriptions`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty or the HTTP client cannot be built
    pub fn new(config: &TranscriberConfig) -> Result<Self> {
        if config.api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "speech API key required for transcription".to_string(),
            ));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/audio/transcriptions",
                config.api_url.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    /// Transcribe a 16kHz mono segment
    ///
    /// # Errors
    ///
    /// Returns error if encoding, the request, or response parsing fails
    pub fn transcribe(&self, samples: &[f32]) -> Result<String> {
        let wav = encode_wav(samples, CAPTURE_RATE)?;
        tracing::debug!(audio_bytes = wav.len(), "starting transcription");

        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Stt(e.to_string()))?;

        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!("transcription API error {status}: {body}")));
        }

        let body = response.text()?;
        let text = parse_transcription(&body)?;
        tracing::debug!(transcript = %text, "transcription complete");
        Ok(text)
    }
}

/// Extract trimmed text from a transcription response body
fn parse_transcription(body: &str) -> Result<String> {
    let parsed: TranscriptionResponse = serde_json::from_str(body)?;
    Ok(parsed.text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_url: &str, key: &str) -> TranscriberConfig {
        TranscriberConfig {
            api_url: api_url.to_string(),
            api_key: SecretString::from(key.to_string()),
            model: "whisper-1".to_string(),
        }
    }

    #[test]
    fn empty_key_is_rejected() {
        let result = Transcriber::new(&config("https://api.example.com/v1", ""));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let stt = Transcriber::new(&config("https://api.example.com/v1/", "sk-test")).unwrap();
        assert_eq!(stt.endpoint, "https://api.example.com/v1/audio/transcriptions");
    }

    #[test]
    fn response_text_is_trimmed() {
        let text = parse_transcription(r#"{"text":" Hello world, what time is it? "}"#).unwrap();
        assert_eq!(text, "Hello world, what time is it?");
    }

    #[test]
    fn malformed_response_is_an_error() {
        assert!(matches!(
            parse_transcription("not json"),
            Err(Error::Serialization(_))
        ));
    }
}
