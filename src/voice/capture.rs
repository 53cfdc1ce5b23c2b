//! Microphone capture

use std::fmt::Display;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, Device, PlayStreamError, SampleFormat, SampleRate, Stream, StreamConfig,
    SupportedStreamConfigsError,
};

use crate::{Error, Result};

/// Capture rate expected by the transcription API (16kHz mono)
pub const CAPTURE_RATE: u32 = 16_000;

/// Most audio held between drains; older samples are dropped first
const MAX_PENDING: usize = CAPTURE_RATE as usize * 30;

/// Microphone stream folding every frame down to mono
///
/// `Stream` is not `Send` on every host, so a `Microphone` must stay on the
/// thread that opened it.
pub struct Microphone {
    device: Device,
    config: StreamConfig,
    pending: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl Microphone {
    /// Open the default input device at [`CAPTURE_RATE`]
    ///
    /// Mono configs are preferred; multichannel input is averaged per frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if there is no input device or it
    /// went away, and [`Error::Audio`] if it cannot capture at that rate.
    pub fn open() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(device_error)?
            .filter(|c| {
                c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(CAPTURE_RATE)
                    && c.max_sample_rate() >= SampleRate(CAPTURE_RATE)
            })
            .min_by_key(cpal::SupportedStreamConfigRange::channels)
            .ok_or_else(|| Error::Audio("no 16kHz input config".to_string()))?;

        let config = supported.with_sample_rate(SampleRate(CAPTURE_RATE)).config();

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            channels = config.channels,
            sample_rate = CAPTURE_RATE,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            pending: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Begin streaming samples into the buffer
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if the device was unplugged, and
    /// [`Error::Audio`] for any other stream failure.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let pending = Arc::clone(&self.pending);
        let channels = usize::from(self.config.channels);
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = pending.lock() {
                        push_frames(&mut buf, data, channels);
                    }
                },
                |err| tracing::error!(error = %err, "microphone stream error"),
                None,
            )
            .map_err(device_error)?;

        stream.play().map_err(device_error)?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Stop streaming and discard buffered samples
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("microphone stopped");
        }
        if let Ok(mut buf) = self.pending.lock() {
            buf.clear();
        }
    }

    /// Mono samples captured since the last call
    #[must_use]
    pub fn drain(&self) -> Vec<f32> {
        self.pending
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}

/// Append interleaved `data` to `buf` as mono, keeping at most [`MAX_PENDING`]
fn push_frames(buf: &mut Vec<f32>, data: &[f32], channels: usize) {
    if channels <= 1 {
        buf.extend_from_slice(data);
    } else {
        #[allow(clippy::cast_precision_loss)]
        let scale = 1.0 / channels as f32;
        buf.extend(data.chunks(channels).map(|frame| frame.iter().sum::<f32>() * scale));
    }

    if buf.len() > MAX_PENDING {
        let excess = buf.len() - MAX_PENDING;
        buf.drain(..excess);
    }
}

/// cpal errors that mean the device itself is gone
trait DeviceLoss: Display {
    fn device_lost(&self) -> bool;
}

impl DeviceLoss for SupportedStreamConfigsError {
    fn device_lost(&self) -> bool {
        matches!(self, Self::DeviceNotAvailable)
    }
}

impl DeviceLoss for BuildStreamError {
    fn device_lost(&self) -> bool {
        matches!(self, Self::DeviceNotAvailable)
    }
}

impl DeviceLoss for PlayStreamError {
    fn device_lost(&self) -> bool {
        matches!(self, Self::DeviceNotAvailable)
    }
}

fn device_error(e: impl DeviceLoss) -> Error {
    if e.device_lost() {
        Error::DeviceUnavailable(e.to_string())
    } else {
        Error::Audio(e.to_string())
    }
}

/// Scale a float sample to 16-bit PCM, saturating out-of-range input
#[allow(clippy::cast_possible_truncation)]
fn to_pcm16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Encode mono samples as 16-bit PCM WAV
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wav_error = |e: hound::Error| Error::Audio(e.to_string());

    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
    for &sample in samples {
        writer.write_sample(to_pcm16(sample)).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;

    Ok(cursor.into_inner())
}
