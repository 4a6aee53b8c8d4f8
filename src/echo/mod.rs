//! Acoustic echo suppression
//!
//! The speaker and microphone share a cabin, so every window the listener
//! records may contain the system's own prompt. Suppression works on two
//! levels:
//! - audio: the last emitted clips form a noise profile for a gate, and an
//!   energy VAD drops windows with too little voiced audio
//! - text: transcripts are scored against recently spoken messages

mod scoring;
mod screen;

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::EchoConfig;

pub use scoring::{
    EchoScore, RECENT_MESSAGE_CAPACITY, RecentSystemMessages, is_echo, score, words,
};
pub use screen::{reduce_noise, voiced_ratio};

#[derive(Default)]
struct EchoState {
    recent: RecentSystemMessages,
    reference: VecDeque<Vec<f32>>,
    speaking: bool,
    last_system_audio: Option<Instant>,
}

/// Shared echo state plus the screening and scoring entry points
pub struct EchoCancellationFilter {
    config: EchoConfig,
    state: Mutex<EchoState>,
}

impl EchoCancellationFilter {
    #[must_use]
    pub fn new(config: EchoConfig) -> Self {
        Self {
            config,
            state: Mutex::new(EchoState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, EchoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn config(&self) -> &EchoConfig {
        &self.config
    }

    /// Remember a message the system is about to say
    pub fn remember(&self, message: &str) {
        self.state().recent.push(message);
    }

    /// Snapshot of the recent messages, oldest first
    #[must_use]
    pub fn recent_messages(&self) -> Vec<String> {
        self.state().recent.iter().map(str::to_owned).collect()
    }

    /// Record that playback just started
    pub fn mark_speaking(&self) {
        let mut state = self.state();
        state.speaking = true;
        state.last_system_audio = Some(Instant::now());
    }

    pub fn mark_not_speaking(&self) {
        self.state().speaking = false;
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state().speaking
    }

    /// Append emitted audio to the reference buffer
    pub fn push_reference(&self, samples: &[f32]) {
        let frame = self.config.frame_size.max(1);
        let limit = self.config.max_reference_chunks;
        let mut state = self.state();
        for chunk in samples.chunks(frame) {
            state.reference.push_back(chunk.to_vec());
        }
        while state.reference.len() > limit {
            state.reference.pop_front();
        }
    }

    /// Drain the reference buffer, returning the emitted audio oldest first
    #[must_use]
    pub fn take_reference(&self) -> Vec<f32> {
        self.state().reference.drain(..).flatten().collect()
    }

    #[must_use]
    pub fn reference_len(&self) -> usize {
        self.state().reference.len()
    }

    /// Drop per-escalation scratch (reference audio, speaking flag)
    ///
    /// Recent messages survive; they describe what the cabin may still echo.
    pub fn reset(&self) {
        let mut state = self.state();
        state.reference.clear();
        state.speaking = false;
    }

    /// Time since the system last started playing audio
    #[must_use]
    pub fn since_system_audio(&self) -> Option<Duration> {
        self.state().last_system_audio.map(|t| t.elapsed())
    }

    /// Noise-gate then voice-gate a recorded window
    ///
    /// `reference` is the audio emitted before the window and serves as the
    /// noise profile. Returns `None` when the window should be discarded
    /// before transcription.
    #[must_use]
    pub fn screen(&self, mut samples: Vec<f32>, reference: &[f32]) -> Option<Vec<f32>> {
        if !reference.is_empty() {
            reduce_noise(&mut samples, reference, self.config.frame_size);
        }

        if self.config.vad_enabled {
            let ratio = voiced_ratio(
                &samples,
                self.config.frame_size,
                self.config.vad_energy_threshold,
            )
            .unwrap_or(0.0);
            if ratio < self.config.min_voice_ratio {
                tracing::debug!(ratio, "not enough voiced audio, discarding window");
                return None;
            }
        }

        Some(samples)
    }

    /// Whether a transcript heard right now is the system hearing itself
    #[must_use]
    pub fn is_echo(&self, transcript: &str) -> bool {
        self.is_echo_at(transcript, self.since_system_audio())
    }

    /// Whether a transcript is echo, given how long after system audio its
    /// recording began
    #[must_use]
    pub fn is_echo_at(&self, transcript: &str, since_system_audio: Option<Duration>) -> bool {
        let state = self.state();
        let echo = is_echo(transcript, state.recent.iter(), since_system_audio, &self.config);
        if echo {
            tracing::debug!(transcript, ?since_system_audio, "transcript matches recent system speech");
        }
        echo
    }
}

impl Default for EchoCancellationFilter {
    fn default() -> Self {
        Self::new(EchoConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_buffer_is_bounded() {
        let filter = EchoCancellationFilter::new(EchoConfig {
            frame_size: 10,
            max_reference_chunks: 4,
            ..EchoConfig::default()
        });
        filter.push_reference(&[0.1; 35]);
        assert_eq!(filter.reference_len(), 4);
        assert_eq!(filter.take_reference().len(), 35);
        assert_eq!(filter.reference_len(), 0);
    }

    #[test]
    fn mostly_silent_window_is_discarded() {
        let filter = EchoCancellationFilter::default();
        let mut samples = vec![0.5; 320 * 2];
        samples.extend(vec![0.0; 320 * 8]);
        assert!(filter.screen(samples, &[]).is_none());
    }

    #[test]
    fn voiced_window_passes() {
        let filter = EchoCancellationFilter::default();
        let samples = vec![0.5; 320 * 10];
        assert_eq!(filter.screen(samples.clone(), &[]), Some(samples));
    }

    #[test]
    fn disabled_vad_passes_everything() {
        let filter = EchoCancellationFilter::new(EchoConfig {
            vad_enabled: false,
            ..EchoConfig::default()
        });
        assert!(filter.screen(vec![0.0; 64], &[]).is_some());
    }

    #[test]
    fn bleed_is_gated_before_voice_detection() {
        let filter = EchoCancellationFilter::default();
        filter.push_reference(&[0.2; 3200]);
        let reference = filter.take_reference();

        // Loud enough to pass VAD on its own, but under the playback floor
        let bleed = vec![0.1; 320 * 10];
        assert!(filter.screen(bleed.clone(), &[]).is_some());
        assert!(filter.screen(bleed, &reference).is_none());

        let speech = vec![0.6; 320 * 10];
        let kept = filter.screen(speech, &reference).unwrap();
        assert!(kept.iter().all(|s| (s - 0.4).abs() < 1e-4));
    }

    #[test]
    fn recency_is_judged_from_recording_start() {
        let filter = EchoCancellationFilter::default();
        filter.remember("Please keep your eyes on the road ahead");

        let transcript = "keep your eyes on the road";
        assert!(filter.is_echo_at(transcript, Some(Duration::from_millis(40))));
        assert!(!filter.is_echo_at(transcript, Some(Duration::from_secs(3))));
        assert!(!filter.is_echo_at(transcript, None));
    }

    #[test]
    fn just_spoken_prompt_is_echo() {
        let filter = EchoCancellationFilter::default();
        filter.remember("Please count from twenty to thirty");
        filter.mark_speaking();
        assert!(filter.is_speaking());
        assert!(filter.is_echo("count from twenty to thirty"));
        assert!(!filter.is_echo("yes I'm awake"));
    }

    #[test]
    fn reset_keeps_recent_messages() {
        let filter = EchoCancellationFilter::default();
        filter.remember("Hey, are you awake?");
        filter.push_reference(&[0.2; 640]);
        filter.mark_speaking();
        filter.reset();
        assert!(!filter.is_speaking());
        assert_eq!(filter.reference_len(), 0);
        assert_eq!(filter.recent_messages(), ["hey, are you awake?"]);
    }
}
