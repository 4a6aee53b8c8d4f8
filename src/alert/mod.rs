//! Drowsiness alert escalation
//!
//! [`AlertStateMachine`] reacts to drowsiness-level updates by playing alert
//! audio and starting a background listener that talks to the driver until
//! they are confirmed awake.

mod listener;
mod playback;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{AlertMessages, Config, ListenerConfig};
use crate::conversation::ConversationEngine;
use crate::echo::EchoCancellationFilter;
use crate::status::{AlertStatus, StatusBoard};
use crate::voice::{AudioClip, AudioSink, AudioSource, Synthesizer, Transcriber};
use crate::{Error, Result};

pub use playback::AudioPlaybackManager;

/// Drowsiness level reported by the camera pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DrowsinessLevel {
    Awake,
    Normal,
    Extreme,
}

impl DrowsinessLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Awake => "AWAKE",
            Self::Normal => "NORMAL",
            Self::Extreme => "EXTREME",
        }
    }
}

impl fmt::Display for DrowsinessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DrowsinessLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AWAKE" => Ok(Self::Awake),
            "NORMAL" => Ok(Self::Normal),
            "EXTREME" => Ok(Self::Extreme),
            other => Err(Error::InvalidValue(format!("unknown drowsiness level: {other}"))),
        }
    }
}

/// Independently owned playback slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertChannel {
    Normal,
    Extreme,
    NoFace,
    Conversation,
}

impl AlertChannel {
    pub const ALL: [Self; 4] = [Self::Normal, Self::Extreme, Self::NoFace, Self::Conversation];

    /// Channels of which at most one may play at a time
    pub const EXCLUSIVE: [Self; 3] = [Self::Normal, Self::Extreme, Self::Conversation];

    #[must_use]
    pub const fn is_exclusive(self) -> bool {
        !matches!(self, Self::NoFace)
    }

    /// Rank among exclusive channels (higher wins)
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::NoFace => 0,
            Self::Normal => 1,
            Self::Extreme => 2,
            Self::Conversation => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Extreme => "EXTREME",
            Self::NoFace => "NO_FACE",
            Self::Conversation => "CONVERSATION",
        }
    }
}

impl fmt::Display for AlertChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which escalation track currently owns the driver's attention
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemAlertState {
    #[default]
    Idle,
    Normal,
    Extreme,
    Conversation,
}

impl SystemAlertState {
    #[must_use]
    pub const fn normal_active(self) -> bool {
        matches!(self, Self::Normal)
    }

    #[must_use]
    pub const fn extreme_active(self) -> bool {
        matches!(self, Self::Extreme)
    }

    #[must_use]
    pub const fn conversation_active(self) -> bool {
        matches!(self, Self::Conversation)
    }
}

/// Collaborators the state machine drives
pub struct AlertServices {
    pub sink: Arc<dyn AudioSink>,
    pub source: Arc<dyn AudioSource>,
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub engine: ConversationEngine,
}

struct ListenerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    state: SystemAlertState,
    level: DrowsinessLevel,
    listener: Option<ListenerHandle>,
}

/// State shared between the state machine and its listener task
struct Shared {
    playback: AudioPlaybackManager,
    echo: Arc<EchoCancellationFilter>,
    source: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    engine: tokio::sync::Mutex<ConversationEngine>,
    status: StatusBoard,
    messages: AlertMessages,
    listener: ListenerConfig,
    normal_clip: Option<AudioClip>,
    extreme_clip: Option<AudioClip>,
    generation: AtomicU64,
    inner: Mutex<Inner>,
}

impl Shared {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Switch to the conversation track; `None` if the escalation was reset
    fn enter_conversation(&self, generation: u64) -> Option<DrowsinessLevel> {
        let mut inner = self.inner();
        if !self.is_current(generation) {
            return None;
        }
        inner.state = SystemAlertState::Conversation;
        Some(inner.level)
    }

    /// Close the escalation after the driver convinced the service
    fn finish_conversation(&self, generation: u64) -> bool {
        let mut inner = self.inner();
        if !self.is_current(generation) {
            return false;
        }
        inner.state = SystemAlertState::Idle;
        true
    }
}

/// Top-level driver of the alert subsystem
///
/// `update` is synchronous and never waits on audio or network; the listener
/// runs as a background task on the runtime the machine was started on.
pub struct AlertStateMachine {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl AlertStateMachine {
    /// Build the machine and pre-render the alert prompts
    ///
    /// Prompts that fail to synthesize are skipped at play time; the
    /// listener still runs.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime
    pub async fn start(config: &Config, services: AlertServices, status: StatusBoard) -> Self {
        let echo = Arc::new(EchoCancellationFilter::new(config.echo.clone()));
        let playback = AudioPlaybackManager::new(
            services.sink,
            services.synthesizer,
            Arc::clone(&echo),
            config.voice.volume,
        );

        let normal_clip = playback.prepare(&config.messages.normal).await;
        let extreme_clip = playback.prepare(&config.messages.extreme).await;

        tracing::info!(
            normal_ready = normal_clip.is_some(),
            extreme_ready = extreme_clip.is_some(),
            "alert subsystem ready"
        );

        let shared = Shared {
            playback,
            echo,
            source: services.source,
            transcriber: services.transcriber,
            engine: tokio::sync::Mutex::new(services.engine),
            status,
            messages: config.messages.clone(),
            listener: config.listener.clone(),
            normal_clip,
            extreme_clip,
            generation: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                state: SystemAlertState::Idle,
                level: DrowsinessLevel::Awake,
                listener: None,
            }),
        };

        Self {
            shared: Arc::new(shared),
            runtime: Handle::current(),
        }
    }

    /// React to a new drowsiness level
    pub fn update(&self, level: DrowsinessLevel) {
        let shared = &self.shared;
        let mut inner = shared.inner();
        inner.level = level;

        match level {
            DrowsinessLevel::Awake => {
                drop(inner);
                self.reset();
            }
            DrowsinessLevel::Normal => {
                if inner.state != SystemAlertState::Idle {
                    return;
                }
                inner.state = SystemAlertState::Normal;
                self.play_alert(AlertChannel::Normal, shared.normal_clip.as_ref());
                shared.status.publish(AlertStatus::Normal);
                self.ensure_listener(&mut inner);
            }
            DrowsinessLevel::Extreme => {
                // Let a NORMAL prompt finish before escalating
                if shared.playback.is_busy(AlertChannel::Normal) {
                    return;
                }
                if inner.state == SystemAlertState::Normal {
                    shared.playback.stop(AlertChannel::Normal);
                    inner.state = SystemAlertState::Idle;
                }
                if inner.state != SystemAlertState::Idle {
                    return;
                }
                inner.state = SystemAlertState::Extreme;
                self.play_alert(AlertChannel::Extreme, shared.extreme_clip.as_ref());
                shared.status.publish(AlertStatus::Extreme);
                self.ensure_listener(&mut inner);
            }
        }
    }

    fn play_alert(&self, channel: AlertChannel, clip: Option<&AudioClip>) {
        match clip {
            Some(clip) => {
                self.shared.playback.play(channel, clip);
            }
            None => tracing::warn!(%channel, "no alert audio available"),
        }
    }

    /// Spawn the listener unless one is alive or a conversation is running
    fn ensure_listener(&self, inner: &mut Inner) {
        if inner.state.conversation_active() {
            return;
        }
        if inner
            .listener
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
        {
            return;
        }

        let cancel = CancellationToken::new();
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let task = self.runtime.spawn(listener::run(
            Arc::clone(&self.shared),
            cancel.clone(),
            generation,
        ));
        inner.listener = Some(ListenerHandle { cancel, task });
    }

    /// Stop everything and return to AWAKE
    fn reset(&self) {
        let shared = &self.shared;
        shared.generation.fetch_add(1, Ordering::SeqCst);

        let listener = {
            let mut inner = shared.inner();
            inner.state = SystemAlertState::Idle;
            inner.listener.take()
        };
        if let Some(handle) = listener {
            handle.cancel.cancel();
        }

        shared.playback.stop_all();
        shared.echo.reset();
        shared.status.publish(AlertStatus::Awake);
        tracing::info!("driver awake, alerts cleared");
    }

    /// Speak the no-face warning (or `message`) on its own channel
    ///
    /// Does not start the listener. Returns whether playback started.
    pub async fn no_face_alert(&self, message: Option<&str>) -> bool {
        let text = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.shared.messages.no_face.as_str());
        self.shared.playback.speak(AlertChannel::NoFace, text).await
    }

    /// Cancel the listener, wait for it briefly, then silence all channels
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        shared.generation.fetch_add(1, Ordering::SeqCst);

        let listener = {
            let mut inner = shared.inner();
            inner.state = SystemAlertState::Idle;
            inner.listener.take()
        };

        if let Some(ListenerHandle { cancel, mut task }) = listener {
            cancel.cancel();
            if tokio::time::timeout(shared.listener.shutdown_timeout, &mut task)
                .await
                .is_err()
            {
                tracing::warn!("listener did not stop in time, aborting");
                task.abort();
            }
        }

        shared.playback.stop_all();
        shared.echo.reset();
        tracing::info!("alert subsystem stopped");
    }

    #[must_use]
    pub fn state(&self) -> SystemAlertState {
        self.shared.inner().state
    }

    #[must_use]
    pub fn level(&self) -> DrowsinessLevel {
        self.shared.inner().level
    }

    /// Whether a listener task is currently running
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.shared
            .inner()
            .listener
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    #[must_use]
    pub fn status(&self) -> &StatusBoard {
        &self.shared.status
    }

    #[must_use]
    pub fn playback(&self) -> &AudioPlaybackManager {
        &self.shared.playback
    }

    #[must_use]
    pub fn echo(&self) -> &EchoCancellationFilter {
        &self.shared.echo
    }
}
