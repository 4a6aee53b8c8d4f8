//! Audio capture from microphone

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio_util::sync::CancellationToken;

use super::{AudioSource, EndpointState, Endpointer, RecordWindow};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// How often the recorder drains the device buffer
const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// Live microphone stream on the default input device
///
/// Holds a `cpal` stream, which is not `Send`: create, use and drop it on
/// one thread.
pub struct MicCapture {
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl MicCapture {
    /// Open the default input device at 16kHz mono
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device exists
    pub fn open() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("audio capture stopped");
        }
    }

    /// Samples captured since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Drop anything captured so far
    pub fn clear_buffer(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// [`AudioSource`] backed by the default microphone
///
/// Each recording opens the device on the blocking pool and releases it
/// before returning, so no stream outlives its window.
pub struct CpalSource {
    energy_threshold: f32,
}

impl CpalSource {
    #[must_use]
    pub const fn new(energy_threshold: f32) -> Self {
        Self { energy_threshold }
    }

    /// Check that an input device can be opened
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device exists
    pub fn check_device() -> Result<()> {
        MicCapture::open().map(drop)
    }
}

#[async_trait]
impl AudioSource for CpalSource {
    async fn record(&self, window: RecordWindow, cancel: CancellationToken) -> Result<Vec<f32>> {
        let threshold = self.energy_threshold;
        tokio::task::spawn_blocking(move || record_blocking(window, &cancel, threshold))
            .await
            .map_err(|e| Error::Audio(format!("capture task failed: {e}")))?
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

fn record_blocking(
    window: RecordWindow,
    cancel: &CancellationToken,
    energy_threshold: f32,
) -> Result<Vec<f32>> {
    let mut mic = MicCapture::open()?;
    mic.clear_buffer();
    mic.start()?;

    let mut endpointer = Endpointer::new(energy_threshold);
    let mut recorded = Vec::new();
    let started = Instant::now();

    loop {
        std::thread::sleep(DRAIN_INTERVAL);

        if cancel.is_cancelled() {
            tracing::debug!("recording cancelled");
            return Ok(Vec::new());
        }

        let chunk = mic.take_buffer();
        let state = endpointer.process(&chunk);
        recorded.extend_from_slice(&chunk);

        let elapsed = started.elapsed();
        if state == EndpointState::Complete {
            break;
        }
        if elapsed >= window.ceiling {
            tracing::debug!("recording ceiling reached");
            break;
        }
        if !endpointer.heard_speech() && elapsed >= window.speech_start_timeout {
            tracing::debug!("no speech within timeout");
            return Ok(Vec::new());
        }
    }

    mic.stop();
    tracing::debug!(samples = recorded.len(), "recording complete");
    Ok(recorded)
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
