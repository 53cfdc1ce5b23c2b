//! Configuration management for beacon-voice
//!
//! Values are read once at startup. Precedence: environment (or CLI flag),
//! then the TOML file, then built-in defaults.

pub mod file;

use std::time::Duration;

use secrecy::SecretString;

use self::file::{ConfigFile, TimingsFileConfig};

/// Default wake phrase
pub const DEFAULT_WAKE_PHRASE: &str = "hello world";

/// Default relay port
pub const DEFAULT_PORT: u16 = 8003;

/// Default upstream completion endpoint
pub const DEFAULT_UPSTREAM_URL: &str = "https://openrouter.ai/api/v1";

/// Default upstream model
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3-0324:free";

/// Default speech API endpoint (transcription and synthesis)
pub const DEFAULT_SPEECH_API_URL: &str = "https://api.openai.com/v1";

/// Turn-taking delays
///
/// Silence finalization must exceed natural pauses in speech; the restart
/// delays only debounce recognizer restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Restart delay after the recognizer ends on its own
    pub end_restart: Duration,
    /// Restart delay after a recoverable recognizer error
    pub error_restart: Duration,
    /// Restart delay after the assistant finishes speaking
    pub speech_end_restart: Duration,
    /// Delay between a wake detection and stopping the recognizer
    pub wake_stop: Duration,
    /// Quiet interval that finalizes a command
    pub silence: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            end_restart: Duration::from_millis(100),
            error_restart: Duration::from_millis(500),
            speech_end_restart: Duration::from_millis(500),
            wake_stop: Duration::from_millis(100),
            silence: Duration::from_millis(2000),
        }
    }
}

impl Timings {
    /// Overlay millisecond values from the config file
    #[must_use]
    pub fn with_overrides(self, file: &TimingsFileConfig) -> Self {
        let ms = |value: Option<u64>, fallback: Duration| {
            value.map_or(fallback, Duration::from_millis)
        };

        Self {
            end_restart: ms(file.end_restart_ms, self.end_restart),
            error_restart: ms(file.error_restart_ms, self.error_restart),
            speech_end_restart: ms(file.speech_end_restart_ms, self.speech_end_restart),
            wake_stop: ms(file.wake_stop_ms, self.wake_stop),
            silence: ms(file.silence_ms, self.silence),
        }
    }
}

/// Voice client configuration
#[derive(Debug)]
pub struct VoiceConfig {
    /// Phrase that arms command capture
    pub wake_phrase: String,

    /// Relay base URL (e.g. `http://localhost:8003`)
    pub backend_url: String,

    /// Speech API base URL
    pub speech_api_url: String,

    /// Speech API key (from `OPENAI_API_KEY`)
    pub speech_api_key: Option<SecretString>,

    /// STT model
    pub stt_model: String,

    /// TTS model
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f64,

    /// Turn-taking delays
    pub timings: Timings,
}

impl VoiceConfig {
    /// Load voice configuration from the standard config file and environment
    ///
    /// `wake_phrase` and `backend_url` are CLI/env values that win over the file.
    #[must_use]
    pub fn load(wake_phrase: Option<String>, backend_url: Option<String>) -> Self {
        Self::from_file(file::load_config_file(), wake_phrase, backend_url)
    }

    /// Build voice configuration from an already loaded config file
    #[must_use]
    pub fn from_file(
        fc: ConfigFile,
        wake_phrase: Option<String>,
        backend_url: Option<String>,
    ) -> Self {
        let voice = fc.voice;

        Self {
            wake_phrase: wake_phrase
                .or(voice.wake_phrase)
                .unwrap_or_else(|| DEFAULT_WAKE_PHRASE.to_string()),
            backend_url: backend_url
                .or(voice.backend_url)
                .unwrap_or_else(|| format!("http://localhost:{DEFAULT_PORT}")),
            speech_api_url: std::env::var("BEACON_SPEECH_API_URL")
                .ok()
                .or(voice.speech_api_url)
                .unwrap_or_else(|| DEFAULT_SPEECH_API_URL.to_string()),
            speech_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            stt_model: std::env::var("BEACON_STT_MODEL")
                .ok()
                .or(voice.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
            tts_model: std::env::var("BEACON_TTS_MODEL")
                .ok()
                .or(voice.tts_model)
                .unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: voice.tts_voice.unwrap_or_else(|| "alloy".to_string()),
            tts_speed: voice.tts_speed.unwrap_or(1.2),
            timings: Timings::default().with_overrides(&fc.timings),
        }
    }
}

/// Relay server configuration
#[derive(Debug)]
pub struct RelayConfig {
    /// Listen port
    pub port: u16,

    /// Origin allowed by CORS (the voice client's web origin)
    pub allowed_origin: String,

    /// Upstream completion base URL
    pub upstream_url: String,

    /// Upstream model identifier
    pub model: String,

    /// Upstream API key (from `OPENROUTER_API_KEY`)
    pub api_key: SecretString,

    /// Sent upstream as `HTTP-Referer`
    pub site_url: String,

    /// Sent upstream as `X-Title`
    pub site_name: String,

    /// Assistant name used in the system preamble
    pub assistant_name: String,
}

impl RelayConfig {
    /// Load relay configuration from the standard config file and environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_file(file::load_config_file())
    }

    /// Build relay configuration from an already loaded config file
    #[must_use]
    pub fn from_file(fc: ConfigFile) -> Self {
        let relay = fc.relay;

        let api_key = std::env::var("OPENROUTER_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("OPENROUTER_API_KEY not set - upstream requests will be rejected");
        }

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .or(relay.port)
                .unwrap_or(DEFAULT_PORT),
            allowed_origin: std::env::var("FRONTEND_URL")
                .ok()
                .or(relay.allowed_origin)
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            upstream_url: std::env::var("UPSTREAM_URL")
                .ok()
                .or(relay.upstream_url)
                .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
            model: std::env::var("UPSTREAM_MODEL")
                .ok()
                .or(relay.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: SecretString::from(api_key),
            site_url: std::env::var("SITE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            site_name: std::env::var("SITE_NAME")
                .unwrap_or_else(|_| "Voice Assistant App".to_string()),
            assistant_name: std::env::var("ASSISTANT_NAME")
                .ok()
                .or(relay.assistant_name)
                .unwrap_or_else(|| "Beacon".to_string()),
        }
    }
}
