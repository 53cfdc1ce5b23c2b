//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Output rate (matches the speech API's MP3 output)
pub const PLAYBACK_RATE: u32 = 24_000;

/// Blocking player for mono f32 samples on the default output device
pub struct Speaker {
    config: StreamConfig,
}

impl Speaker {
    /// Open the default output device at [`PLAYBACK_RATE`]
    ///
    /// # Errors
    ///
    /// Returns error if no output device supports that rate
    pub fn open() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |channels: u16| {
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == channels
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_RATE)
            })
        };

        // Mono preferred, stereo duplicates each sample
        let supported = supports(1)
            .or_else(|| supports(2))
            .ok_or_else(|| Error::Audio("no suitable output config".to_string()))?;

        let config = supported.with_sample_rate(SampleRate(PLAYBACK_RATE)).config();

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            channels = config.channels,
            "speaker opened"
        );

        Ok(Self { config })
    }

    /// Play samples until done or `cancel` is set
    ///
    /// Returns false if playback was cancelled.
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn play(&self, samples: Vec<f32>, cancel: &AtomicBool) -> Result<bool> {
        if samples.is_empty() {
            return Ok(true);
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("output device disappeared".to_string()))?;

        let channels = usize::from(self.config.channels);
        let total = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or(0.0);
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| tracing::error!(error = %err, "speaker stream error"),
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let expected = Duration::from_millis(total as u64 * 1000 / u64::from(PLAYBACK_RATE));
        let deadline = Instant::now() + expected + Duration::from_millis(500);

        while position.load(Ordering::Relaxed) < total && Instant::now() < deadline {
            if cancel.load(Ordering::Relaxed) {
                tracing::debug!("playback cancelled");
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));
        tracing::debug!(samples = total, "playback complete");

        Ok(!cancel.load(Ordering::Relaxed))
    }
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if a frame fails to decode
pub fn decode_mp3(data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) if frame.channels == 2 => {
                samples.extend(frame.data.chunks(2).map(|pair| {
                    let left = f32::from(pair[0]) / 32768.0;
                    let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                    f32::midpoint(left, right)
                }));
            }
            Ok(frame) => {
                samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

/// Sine tone at [`PLAYBACK_RATE`] with a short linear fade at both ends
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn tone(frequency: f32, duration: Duration, volume: f32) -> Vec<f32> {
    let rate = PLAYBACK_RATE as f32;
    let len = (duration.as_secs_f32() * rate) as usize;
    let fade = (len / 10).max(1);

    (0..len)
        .map(|i| {
            let t = i as f32 / rate;
            let envelope = (i.min(len - 1 - i) as f32 / fade as f32).min(1.0);
            (2.0 * std::f32::consts::PI * frequency * t).sin() * volume * envelope
        })
        .collect()
}
