//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-voice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Voice client configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Turn-taking timings in milliseconds
    #[serde(default)]
    pub timings: TimingsFileConfig,

    /// Relay server configuration
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// Voice client configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Wake phrase (e.g. "hello world")
    pub wake_phrase: Option<String>,

    /// Relay base URL the client sends commands to
    pub backend_url: Option<String>,

    /// Speech API base URL (transcription and synthesis)
    pub speech_api_url: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f64>,
}

/// Turn-taking timings, all in milliseconds
#[derive(Debug, Default, Deserialize)]
pub struct TimingsFileConfig {
    pub end_restart_ms: Option<u64>,
    pub error_restart_ms: Option<u64>,
    pub speech_end_restart_ms: Option<u64>,
    pub wake_stop_ms: Option<u64>,
    pub silence_ms: Option<u64>,
}

/// Relay server configuration
#[derive(Debug, Default, Deserialize)]
pub struct RelayFileConfig {
    /// Listen port
    pub port: Option<u16>,

    /// Allowed CORS origin
    pub allowed_origin: Option<String>,

    /// Upstream completion base URL
    pub upstream_url: Option<String>,

    /// Upstream model identifier
    pub model: Option<String>,

    /// Assistant name used in the system preamble
    pub assistant_name: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
#[must_use]
pub fn load_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-voice/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-voice")
            .join("config.toml")
    })
}
