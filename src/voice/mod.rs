//! Voice I/O: microphone capture, speaker playback, STT and TTS
//!
//! The alert core only sees the traits defined here, so it runs the same
//! against `cpal` devices and HTTP speech services as against test fakes.

mod capture;
mod endpoint;
mod http;
mod null;
mod playback;
mod stt;
mod tts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::alert::AlertChannel;

pub use capture::{CpalSource, MicCapture, SAMPLE_RATE, samples_to_wav};
pub use endpoint::{EndpointState, Endpointer, rms_energy};
pub use null::{NullSynthesizer, NullTranscriber, SilentSink, SilentSource};
pub use playback::{CpalSink, PLAYBACK_SAMPLE_RATE, decode_mp3, resample};
pub use stt::SpeechToText;
pub use tts::TextToSpeech;

/// Mono PCM audio ready to play
#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioClip {
    #[must_use]
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Decode an MP3 payload (as returned by TTS services)
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not valid MP3
    pub fn from_mp3(data: &[u8]) -> Result<Self> {
        let (samples, sample_rate) = decode_mp3(data)?;
        Ok(Self::new(samples, sample_rate))
    }

    /// Copy of this clip with every sample multiplied by `gain`
    #[must_use]
    pub fn with_gain(&self, gain: f32) -> Self {
        if (gain - 1.0).abs() < f32::EPSILON {
            return self.clone();
        }
        Self::new(
            self.samples.iter().map(|s| (s * gain).clamp(-1.0, 1.0)).collect(),
            self.sample_rate,
        )
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playing time of the clip
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Bounds on one recording window
#[derive(Debug, Clone, Copy)]
pub struct RecordWindow {
    /// Hard ceiling on the window
    pub ceiling: Duration,
    /// Return empty if no speech starts within this time
    pub speech_start_timeout: Duration,
}

/// Output device with one independent slot per alert channel
pub trait AudioSink: Send + Sync {
    /// Start playing `clip` on `channel`, replacing whatever that slot was playing
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be used
    fn start(&self, channel: AlertChannel, clip: &AudioClip) -> Result<()>;

    /// Stop the channel; no-op if idle
    fn stop(&self, channel: AlertChannel);

    /// Whether the channel is still playing
    fn is_busy(&self, channel: AlertChannel) -> bool;

    /// Convert `clip` into the form `start` plays without further work
    ///
    /// # Errors
    ///
    /// Returns error if the clip cannot be converted for this device
    fn prepare(&self, clip: AudioClip) -> Result<AudioClip> {
        Ok(clip)
    }
}

/// Microphone that records one bounded window at a time
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Record until the utterance ends, the ceiling is hit or `cancel` fires
    ///
    /// An empty result means nobody spoke (or the recording was cancelled).
    ///
    /// # Errors
    ///
    /// Returns error if the input device is unavailable
    async fn record(&self, window: RecordWindow, cancel: CancellationToken) -> Result<Vec<f32>>;

    /// Sample rate of recorded audio
    fn sample_rate(&self) -> u32;
}

/// Speech-to-text service
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Best-effort transcript; empty for silence
    ///
    /// # Errors
    ///
    /// Returns error if the service cannot be reached
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String>;
}

/// Text-to-speech service
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Render `text` as a playable clip
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or decoding fails
    async fn synthesize(&self, text: &str) -> Result<AudioClip>;
}
