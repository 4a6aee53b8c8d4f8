//! Conversational memory: driver profile, rolling history and topic pool

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Number of turns kept in the rolling history
pub const HISTORY_LIMIT: usize = 2;

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
}

/// One utterance in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Turn spoken by the driver, stamped now
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Turn spoken by the system, stamped now
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// What the system knows about the driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub family: BTreeMap<String, String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    #[serde(default)]
    pub past_events: BTreeMap<String, String>,
}

/// Topics the driver has engaged with, deduplicated by exact string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicPool(Vec<String>);

impl TopicPool {
    /// Add a topic; returns false if it was already present or blank
    pub fn insert(&mut self, topic: &str) -> bool {
        let topic = topic.trim();
        if topic.is_empty() || self.0.iter().any(|t| t == topic) {
            return false;
        }
        self.0.push(topic.to_string());
        true
    }

    /// Pick one topic uniformly at random
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.0.choose(rng).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// The persisted conversation document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    #[serde(default)]
    pub driver_details: DriverProfile,
    #[serde(default)]
    pub topics: TopicPool,
}

impl ConversationContext {
    /// Append a turn, keeping only the most recent [`HISTORY_LIMIT`]
    pub fn push_turn(&mut self, turn: ConversationTurn) {
        self.history.push(turn);
        self.truncate_history();
    }

    /// Drop all but the most recent [`HISTORY_LIMIT`] turns
    pub fn truncate_history(&mut self) {
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    /// Record a topic of interest in both the profile and the pool
    pub fn remember_topic(&mut self, topic: &str, note: impl Into<String>) -> bool {
        let topic = topic.trim();
        if topic.is_empty() {
            return false;
        }
        self.driver_details
            .preferences
            .insert(topic.to_string(), note.into());
        self.topics.insert(topic)
    }

    /// Compact, prompt-sized summary of what is known
    ///
    /// Only non-empty profile fields are included.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        let profile = &self.driver_details;

        if !profile.name.trim().is_empty() {
            parts.push(format!("Driver's name: {}", profile.name.trim()));
        }
        if let Some(family) = join_notes(&profile.family) {
            parts.push(format!("Family: {family}"));
        }
        if let Some(prefs) = join_notes(&profile.preferences) {
            parts.push(format!("Interests: {prefs}"));
        }
        if let Some(events) = join_notes(&profile.past_events) {
            parts.push(format!("Past events: {events}"));
        }
        if !self.history.is_empty() {
            let turns: Vec<String> = self
                .history
                .iter()
                .map(|t| {
                    let who = match t.role {
                        Role::User => "driver",
                        Role::System => "assistant",
                    };
                    format!("{who}: \"{}\"", t.content)
                })
                .collect();
            parts.push(format!("Recent conversation: {}", turns.join(" / ")));
        }

        parts.join("\n")
    }
}

fn join_notes(map: &BTreeMap<String, String>) -> Option<String> {
    let items: Vec<String> = map
        .iter()
        .filter(|(k, _)| !k.trim().is_empty())
        .map(|(k, v)| {
            if v.trim().is_empty() {
                k.clone()
            } else {
                format!("{k} ({v})")
            }
        })
        .collect();
    (!items.is_empty()).then(|| items.join(", "))
}
