//! Utterance endpointing
//!
//! Decides when a driver has started and finished answering, using local
//! energy detection over the incoming microphone chunks.

/// Minimum duration of speech before an utterance can end (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Trailing silence that ends an utterance (in samples at 16kHz)
const PAUSE_SAMPLES: usize = 12800; // 0.8 seconds

/// Where the current window stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Nothing above the energy threshold yet
    Waiting,
    /// Driver is speaking (or pausing briefly)
    Speaking,
    /// Speech followed by a long enough pause
    Complete,
}

/// Tracks speech start and end across microphone chunks
pub struct Endpointer {
    energy_threshold: f32,
    state: EndpointState,
    speech_samples: usize,
    silence_samples: usize,
}

impl Endpointer {
    #[must_use]
    pub const fn new(energy_threshold: f32) -> Self {
        Self {
            energy_threshold,
            state: EndpointState::Waiting,
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    /// Feed the next chunk and return the updated state
    pub fn process(&mut self, samples: &[f32]) -> EndpointState {
        if samples.is_empty() {
            return self.state;
        }

        let energy = rms_energy(samples);
        let is_speech = energy > self.energy_threshold;

        match self.state {
            EndpointState::Waiting => {
                if is_speech {
                    self.state = EndpointState::Speaking;
                    self.speech_samples = samples.len();
                    self.silence_samples = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            EndpointState::Speaking => {
                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += samples.len();
                }

                if self.silence_samples > PAUSE_SAMPLES
                    && self.speech_samples > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(speech_samples = self.speech_samples, "utterance complete");
                    self.state = EndpointState::Complete;
                } else if self.silence_samples > PAUSE_SAMPLES * 2 {
                    // A blip too short to be an answer
                    tracing::trace!("speech too short, waiting again");
                    self.reset();
                }
            }
            EndpointState::Complete => {}
        }

        self.state
    }

    /// Whether any speech has been heard in this window
    #[must_use]
    pub fn heard_speech(&self) -> bool {
        self.state != EndpointState::Waiting
    }

    #[must_use]
    pub const fn state(&self) -> EndpointState {
        self.state
    }

    /// Start over for a new window
    pub const fn reset(&mut self) {
        self.state = EndpointState::Waiting;
        self.speech_samples = 0;
        self.silence_samples = 0;
    }
}

/// RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
