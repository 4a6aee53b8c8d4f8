//! Externally observable alert status
//!
//! A single current value, polled or subscribed to by the control API.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::alert::DrowsinessLevel;
use crate::Error;

/// What the subsystem is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertStatus {
    /// No escalation in progress
    Awake,
    /// Normal drowsiness alert issued
    Normal,
    /// Extreme drowsiness alert issued
    Extreme,
    /// Recording the driver's answer
    Listening,
    /// System is speaking a conversational prompt
    System,
}

impl AlertStatus {
    /// Uppercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Awake => "AWAKE",
            Self::Normal => "NORMAL",
            Self::Extreme => "EXTREME",
            Self::Listening => "LISTENING",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AWAKE" => Ok(Self::Awake),
            "NORMAL" => Ok(Self::Normal),
            "EXTREME" => Ok(Self::Extreme),
            "LISTENING" => Ok(Self::Listening),
            "SYSTEM" => Ok(Self::System),
            other => Err(Error::InvalidValue(format!("unknown status: {other}"))),
        }
    }
}

impl From<DrowsinessLevel> for AlertStatus {
    fn from(level: DrowsinessLevel) -> Self {
        match level {
            DrowsinessLevel::Awake => Self::Awake,
            DrowsinessLevel::Normal => Self::Normal,
            DrowsinessLevel::Extreme => Self::Extreme,
        }
    }
}

/// Publishes the current status to any number of readers
#[derive(Debug, Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<AlertStatus>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Create a board starting at `AWAKE`
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AlertStatus::Awake);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current status
    ///
    /// Subscribers are only woken when the value actually changes.
    pub fn publish(&self, status: AlertStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            tracing::debug!(%status, "status changed");
        }
    }

    /// Current status
    #[must_use]
    pub fn current(&self) -> AlertStatus {
        *self.tx.borrow()
    }

    /// Subscribe to status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AlertStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_awake() {
        assert_eq!(StatusBoard::new().current(), AlertStatus::Awake);
    }

    #[test]
    fn publish_is_visible_to_subscribers() {
        let board = StatusBoard::new();
        let mut rx = board.subscribe();

        board.publish(AlertStatus::Listening);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), AlertStatus::Listening);

        // Same value again does not wake readers
        board.publish(AlertStatus::Listening);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            AlertStatus::Awake,
            AlertStatus::Normal,
            AlertStatus::Extreme,
            AlertStatus::Listening,
            AlertStatus::System,
        ] {
            assert_eq!(status.as_str().parse::<AlertStatus>().unwrap(), status);
        }
        assert!("dozing".parse::<AlertStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&AlertStatus::System).unwrap(),
            "\"SYSTEM\""
        );
    }
}
