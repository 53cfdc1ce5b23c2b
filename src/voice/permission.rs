//! Microphone access status

use cpal::traits::{DeviceTrait, HostTrait};

/// Microphone access status, checked once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionStatus {
    /// Check still running
    #[default]
    Checking,
    /// Microphone available
    Granted,
    /// Microphone refused or missing; recognition is disabled for good
    Denied,
    /// Access would require a user prompt
    Prompt,
}

impl PermissionStatus {
    /// Whether recognition may run
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Check microphone access on the default audio host
///
/// Desktop hosts do not prompt, so the result is either `Granted` or `Denied`.
#[must_use]
pub fn check_microphone() -> PermissionStatus {
    let host = cpal::default_host();

    let Some(device) = host.default_input_device() else {
        tracing::warn!("no input device available");
        return PermissionStatus::Denied;
    };

    match device.default_input_config() {
        Ok(config) => {
            tracing::debug!(
                device = %device.name().unwrap_or_default(),
                sample_rate = config.sample_rate().0,
                "microphone access granted"
            );
            PermissionStatus::Granted
        }
        Err(e) => {
            tracing::warn!(error = %e, "microphone access denied");
            PermissionStatus::Denied
        }
    }
}
