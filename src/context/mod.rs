//! Persisted conversational memory
//!
//! Holds:
//! - Rolling history (last two turns)
//! - Driver profile (family, interests, past events)
//! - Topic pool used to seed future prompts

mod memory;
mod store;

pub use memory::{
    ConversationContext, ConversationTurn, DriverProfile, HISTORY_LIMIT, Role, TopicPool,
};
pub use store::{ContextBackend, ContextStore, JsonFileBackend, MemoryBackend};
