//! Stand-ins used when audio hardware or speech services are unavailable
//!
//! The alert subsystem keeps running on these; it just cannot be heard or
//! hear anything.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{AudioClip, AudioSink, AudioSource, RecordWindow, SAMPLE_RATE, Synthesizer, Transcriber};
use crate::alert::AlertChannel;
use crate::{Error, Result};

/// Sink that accepts every clip and is never busy
pub struct SilentSink;

impl AudioSink for SilentSink {
    fn start(&self, channel: AlertChannel, clip: &AudioClip) -> Result<()> {
        tracing::debug!(%channel, samples = clip.samples().len(), "no output device, dropping clip");
        Ok(())
    }

    fn stop(&self, _channel: AlertChannel) {}

    fn is_busy(&self, _channel: AlertChannel) -> bool {
        false
    }
}

/// Source that hears nothing for the length of each window
pub struct SilentSource;

#[async_trait]
impl AudioSource for SilentSource {
    async fn record(&self, window: RecordWindow, cancel: CancellationToken) -> Result<Vec<f32>> {
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(window.ceiling) => {}
        }
        Ok(Vec::new())
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

/// Transcriber for setups without an STT backend
pub struct NullTranscriber;

#[async_trait]
impl Transcriber for NullTranscriber {
    async fn transcribe(&self, _samples: &[f32], _sample_rate: u32) -> Result<String> {
        Err(Error::Stt("no STT backend configured".to_string()))
    }
}

/// Synthesizer for setups without a TTS backend
pub struct NullSynthesizer;

#[async_trait]
impl Synthesizer for NullSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<AudioClip> {
        Err(Error::Tts("no TTS backend configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn silent_source_returns_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let window = RecordWindow {
            ceiling: Duration::from_secs(60),
            speech_start_timeout: Duration::from_secs(5),
        };
        let samples = SilentSource.record(window, cancel).await.unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn silent_sink_is_never_busy() {
        let clip = AudioClip::new(vec![0.1; 10], 16000);
        SilentSink.start(AlertChannel::Normal, &clip).unwrap();
        assert!(!SilentSink.is_busy(AlertChannel::Normal));
    }
}
