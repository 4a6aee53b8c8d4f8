//! Text-level echo scoring
//!
//! Decides whether a transcript is the system hearing itself rather than
//! the driver answering. Everything here is pure so the thresholds can be
//! exercised without audio.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::config::EchoConfig;

/// Messages kept for echo matching
pub const RECENT_MESSAGE_CAPACITY: usize = 5;

/// Last few things the system said, lowercased, oldest first
#[derive(Debug, Clone, Default)]
pub struct RecentSystemMessages {
    messages: VecDeque<String>,
}

impl RecentSystemMessages {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a spoken message, evicting the oldest past capacity
    pub fn push(&mut self, message: &str) {
        let message = message.trim().to_lowercase();
        if message.is_empty() {
            return;
        }
        self.messages.push_back(message);
        while self.messages.len() > RECENT_MESSAGE_CAPACITY {
            self.messages.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Outcome of scoring one transcript
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EchoScore {
    /// Transcript contains a recent message word for word
    Verbatim,
    /// Heuristic score; not normalized to 0..1
    Probability(f32),
}

impl EchoScore {
    #[must_use]
    pub fn is_echo(self, threshold: f32) -> bool {
        match self {
            Self::Verbatim => true,
            Self::Probability(p) => p > threshold,
        }
    }
}

/// Lowercased words with surrounding punctuation trimmed (apostrophes kept)
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
}

/// Score a transcript against what the system recently said
///
/// `since_system_audio` is the time elapsed since the system last started
/// playing audio, or `None` if it never has.
#[must_use]
pub fn score<'a>(
    transcript: &str,
    recent: impl IntoIterator<Item = &'a str>,
    since_system_audio: Option<Duration>,
    config: &EchoConfig,
) -> EchoScore {
    let lowered = transcript.to_lowercase();
    let transcript_words: HashSet<String> = words(&lowered).collect();

    let mut probability = match since_system_audio {
        Some(elapsed) if elapsed < config.recency_window => config.recency_prior,
        _ => 0.0,
    };

    for message in recent {
        let message_words: HashSet<String> = words(message).collect();
        if message_words.is_empty() {
            continue;
        }

        if lowered.contains(message) {
            return EchoScore::Verbatim;
        }

        let shared = message_words.intersection(&transcript_words).count();
        #[allow(clippy::cast_precision_loss)]
        let overlap = shared as f32 / message_words.len() as f32;

        if overlap > config.overlap_threshold {
            probability += config.overlap_boost;
        }
        if message_words.len() < config.short_message_words && overlap < config.short_overlap_floor
        {
            probability -= config.short_message_penalty;
        }
    }

    let attentive = config
        .attention_words
        .iter()
        .any(|word| transcript_words.contains(word.as_str()));
    if attentive {
        probability -= config.attention_discount;
    }

    EchoScore::Probability(probability)
}

/// Whether `transcript` should be discarded as the system's own voice
#[must_use]
pub fn is_echo<'a>(
    transcript: &str,
    recent: impl IntoIterator<Item = &'a str>,
    since_system_audio: Option<Duration>,
    config: &EchoConfig,
) -> bool {
    score(transcript, recent, since_system_audio, config).is_echo(config.decision_threshold)
}
