//! Nocturne - drowsy-driver alerting and alertness dialogue
//!
//! This library provides the alert subsystem that sits behind a drowsiness
//! classifier:
//! - Escalating alert audio with prioritized playback channels
//! - Background listening with echo suppression
//! - Alertness dialogue judged by a remote reasoning service
//! - Persisted conversational memory of the driver
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          Drowsiness feed  /  Control API            │
//! └────────────────────┬────────────────────────────────┘
//!                      │ level updates
//! ┌────────────────────▼────────────────────────────────┐
//! │               AlertStateMachine                      │
//! │  Playback  │  Listener  │  Echo filter  │  Status   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ transcripts
//! ┌────────────────────▼────────────────────────────────┐
//! │   ConversationEngine  │  ContextStore  │  Gemini    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod alert;
pub mod api;
pub mod config;
pub mod context;
pub mod conversation;
pub mod daemon;
pub mod echo;
pub mod error;
pub mod status;
pub mod voice;

pub use alert::{
    AlertChannel, AlertServices, AlertStateMachine, AudioPlaybackManager, DrowsinessLevel,
    SystemAlertState,
};
pub use config::Config;
pub use context::{ContextStore, ConversationContext};
pub use conversation::{ConversationEngine, ConversationVerdict, ReasoningService};
pub use daemon::Daemon;
pub use echo::EchoCancellationFilter;
pub use error::{Error, Result};
pub use status::{AlertStatus, StatusBoard};
