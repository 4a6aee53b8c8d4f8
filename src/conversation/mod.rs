//! Alertness dialogue
//!
//! Turns a driver's transcribed answer into a verdict: either the driver is
//! convinced to be alert, or there is a new prompt to speak. The engine owns
//! the conversation context and persists it after every turn.

mod reasoning;

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;

use crate::alert::DrowsinessLevel;
use crate::config::AlertMessages;
use crate::context::{ConversationContext, ConversationTurn, ContextStore};
use crate::{Error, Result};

pub use reasoning::{
    GeminiClient, OfflineReasoner, ReasoningRequest, ReasoningService, build_prompt,
};

/// Outcome of one conversational turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationVerdict {
    /// Terminal for the current escalation when true
    pub convinced: bool,
    /// What to say next (the confirmation when convinced)
    pub message: String,
    /// Topic the driver engaged with; empty if none
    pub topic: String,
}

/// Validated shape of a reasoning service reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawVerdict {
    pub convinced: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

/// Extract and validate the verdict object from model text
///
/// The model may wrap the object in prose or code fences, so everything
/// between the first `{` and the last `}` is parsed.
///
/// # Errors
///
/// Returns error if no object is found or it lacks a boolean `convinced`
pub fn parse_verdict(raw: &str) -> Result<RawVerdict> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => {
            return Err(Error::Reasoning(
                "no JSON object in reasoning reply".to_string(),
            ));
        }
    };

    serde_json::from_str(json).map_err(|e| Error::Reasoning(format!("malformed verdict: {e}")))
}

/// Reasoning reply for one answer, not yet applied to the context
#[derive(Debug)]
pub struct PendingTurn {
    transcript: String,
    reply: Result<RawVerdict>,
}

impl PendingTurn {
    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// Runs driver answers past the reasoning service and keeps the memory
pub struct ConversationEngine {
    store: ContextStore,
    context: ConversationContext,
    reasoner: Arc<dyn ReasoningService>,
    messages: AlertMessages,
    rng: StdRng,
}

impl ConversationEngine {
    /// Load the persisted context and build an engine around it
    #[must_use]
    pub fn new(
        store: ContextStore,
        reasoner: Arc<dyn ReasoningService>,
        messages: AlertMessages,
    ) -> Self {
        let context = store.load();
        tracing::debug!(
            turns = context.history.len(),
            topics = context.topics.len(),
            "conversation context loaded"
        );
        Self {
            store,
            context,
            reasoner,
            messages,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a fixed random source for topic sampling
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    #[must_use]
    pub const fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Judge one answer and commit the outcome; never fails
    ///
    /// Transport or parse failures yield a non-convinced verdict carrying the
    /// fallback message.
    pub async fn evaluate(
        &mut self,
        transcript: &str,
        level: DrowsinessLevel,
    ) -> ConversationVerdict {
        let pending = self.request(transcript, level).await;
        self.commit(pending)
    }

    /// Ask the reasoning service about one answer without touching the context
    ///
    /// The returned turn only takes effect once passed to [`Self::commit`];
    /// dropping it leaves the context and the store as they were.
    pub async fn request(&mut self, transcript: &str, level: DrowsinessLevel) -> PendingTurn {
        let mut draft = self.context.clone();
        draft.push_turn(ConversationTurn::user(transcript));

        let request = ReasoningRequest {
            level,
            summary: draft.summary(),
            topic: self
                .context
                .topics
                .sample(&mut self.rng)
                .map(str::to_owned)
                .unwrap_or_default(),
            transcript: transcript.to_string(),
        };

        let reply = self
            .reasoner
            .evaluate(&request)
            .await
            .and_then(|text| parse_verdict(&text));

        PendingTurn {
            transcript: transcript.to_string(),
            reply,
        }
    }

    /// Record a turn in the context, persist it and produce the verdict
    pub fn commit(&mut self, pending: PendingTurn) -> ConversationVerdict {
        self.context.push_turn(ConversationTurn::user(pending.transcript));

        let verdict = match pending.reply {
            Ok(raw) => self.apply(raw),
            Err(e) => {
                tracing::warn!(error = %e, "reasoning failed, using fallback prompt");
                ConversationVerdict {
                    convinced: false,
                    message: self.messages.fallback.clone(),
                    topic: String::new(),
                }
            }
        };

        if let Err(e) = self.store.save(&self.context) {
            tracing::warn!(error = %e, "failed to persist conversation context");
        }

        tracing::info!(
            convinced = verdict.convinced,
            topic = %verdict.topic,
            "conversation turn evaluated"
        );
        verdict
    }

    fn apply(&mut self, raw: RawVerdict) -> ConversationVerdict {
        let topic = raw.topic.unwrap_or_default().trim().to_string();
        if !topic.is_empty() {
            let note = format!("mentioned on {}", chrono::Utc::now().format("%Y-%m-%d"));
            self.context.remember_topic(&topic, note);
        }

        if raw.convinced {
            return ConversationVerdict {
                convinced: true,
                message: self.messages.confirmation.clone(),
                topic,
            };
        }

        let message = raw
            .message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.messages.fallback.clone());
        self.context.push_turn(ConversationTurn::system(message.clone()));

        ConversationVerdict {
            convinced: false,
            message,
            topic,
        }
    }
}
