//! Audible acknowledgement of the wake phrase

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use super::playback::{Speaker, tone};

/// Cue played when the wake phrase is heard
pub trait WakeCue: Send {
    /// Play the cue without blocking the caller
    fn play(&mut self);
}

/// Short sine beep on the default output device
#[derive(Debug, Clone, Copy)]
pub struct ToneCue {
    frequency: f32,
    duration: Duration,
    volume: f32,
}

impl Default for ToneCue {
    fn default() -> Self {
        Self {
            frequency: 800.0,
            duration: Duration::from_millis(200),
            volume: 0.3,
        }
    }
}

impl WakeCue for ToneCue {
    fn play(&mut self) {
        let samples = tone(self.frequency, self.duration, self.volume);

        let spawned = std::thread::Builder::new()
            .name("wake-cue".to_string())
            .spawn(move || {
                let never = AtomicBool::new(false);
                if let Err(e) = Speaker::open().and_then(|speaker| speaker.play(samples, &never)) {
                    tracing::debug!(error = %e, "wake cue unavailable");
                }
            });

        if let Err(e) = spawned {
            tracing::debug!(error = %e, "wake cue thread failed to start");
        }
    }
}

/// Cue that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentCue;

impl WakeCue for SilentCue {
    fn play(&mut self) {}
}
