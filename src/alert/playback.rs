//! Channel arbitration on top of an [`AudioSink`]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::AlertChannel;
use crate::echo::EchoCancellationFilter;
use crate::voice::{AudioClip, AudioSink, Synthesizer};

/// Plays alert audio while enforcing channel priority
///
/// NORMAL, EXTREME and CONVERSATION are mutually exclusive; a request on one
/// of them is dropped while a higher-priority channel is still playing.
/// NO_FACE plays independently of the others.
pub struct AudioPlaybackManager {
    sink: Arc<dyn AudioSink>,
    synthesizer: Arc<dyn Synthesizer>,
    echo: Arc<EchoCancellationFilter>,
    volume: f32,
}

impl AudioPlaybackManager {
    #[must_use]
    pub fn new(
        sink: Arc<dyn AudioSink>,
        synthesizer: Arc<dyn Synthesizer>,
        echo: Arc<EchoCancellationFilter>,
        volume: f32,
    ) -> Self {
        Self {
            sink,
            synthesizer,
            echo,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    /// Start `clip` on `channel`; returns whether playback started
    ///
    /// `clip` should come from [`Self::prepare`], which applies the volume
    /// and converts it for the output device.
    pub fn play(&self, channel: AlertChannel, clip: &AudioClip) -> bool {
        if channel.is_exclusive() {
            if let Some(blocking) = AlertChannel::EXCLUSIVE
                .into_iter()
                .find(|c| c.priority() > channel.priority() && self.sink.is_busy(*c))
            {
                tracing::debug!(%channel, %blocking, "higher priority channel busy, skipping");
                return false;
            }
            for other in AlertChannel::EXCLUSIVE {
                if other.priority() <= channel.priority() {
                    self.sink.stop(other);
                }
            }
        }

        if let Err(e) = self.sink.start(channel, clip) {
            tracing::warn!(%channel, error = %e, "failed to start playback");
            return false;
        }

        self.echo.mark_speaking();
        self.echo.push_reference(clip.samples());
        tracing::debug!(%channel, duration_ms = clip.duration().as_millis(), "playback started");
        true
    }

    /// Synthesize `text`, remember it for echo matching and make it play-ready
    ///
    /// Returns `None` (after logging) if synthesis or conversion fails.
    pub async fn prepare(&self, text: &str) -> Option<AudioClip> {
        self.echo.remember(text);
        let clip = match self.synthesizer.synthesize(text).await {
            Ok(clip) => clip,
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed, skipping playback");
                return None;
            }
        };
        match self.sink.prepare(clip.with_gain(self.volume)) {
            Ok(clip) => Some(clip),
            Err(e) => {
                tracing::warn!(error = %e, "could not convert clip for output device");
                None
            }
        }
    }

    /// Synthesize and play `text`; returns whether playback started
    pub async fn speak(&self, channel: AlertChannel, text: &str) -> bool {
        match self.prepare(text).await {
            Some(clip) => self.play(channel, &clip),
            None => false,
        }
    }

    pub fn stop(&self, channel: AlertChannel) {
        self.sink.stop(channel);
    }

    /// Stop every channel; safe to call repeatedly
    pub fn stop_all(&self) {
        for channel in AlertChannel::ALL {
            self.sink.stop(channel);
        }
        self.echo.mark_not_speaking();
    }

    #[must_use]
    pub fn is_busy(&self, channel: AlertChannel) -> bool {
        self.sink.is_busy(channel)
    }

    #[must_use]
    pub fn any_busy(&self) -> bool {
        AlertChannel::ALL.into_iter().any(|c| self.sink.is_busy(c))
    }

    /// Wait until nothing is playing
    ///
    /// Returns `false` if `cancel` fired first.
    pub async fn wait_idle(&self, poll: Duration, cancel: &CancellationToken) -> bool {
        while self.any_busy() {
            tokio::select! {
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(poll) => {}
            }
        }
        !cancel.is_cancelled()
    }
}
