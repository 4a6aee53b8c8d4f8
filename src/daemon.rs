//! Daemon - the alert service
//!
//! Wires audio devices, speech services, the reasoning client and the
//! control API around one [`AlertStateMachine`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::alert::{AlertServices, AlertStateMachine};
use crate::api::{ApiServer, ApiState};
use crate::context::ContextStore;
use crate::conversation::{ConversationEngine, GeminiClient, OfflineReasoner, ReasoningService};
use crate::status::StatusBoard;
use crate::voice::{
    AudioSink, AudioSource, CpalSink, CpalSource, NullSynthesizer, NullTranscriber, SilentSink,
    SilentSource, SpeechToText, Synthesizer, TextToSpeech, Transcriber,
};
use crate::{Config, Result};

/// Voice collaborators, real or degraded
struct VoiceStack {
    sink: Arc<dyn AudioSink>,
    source: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl VoiceStack {
    fn disabled() -> Self {
        Self {
            sink: Arc::new(SilentSink),
            source: Arc::new(SilentSource),
            transcriber: Arc::new(NullTranscriber),
            synthesizer: Arc::new(NullSynthesizer),
        }
    }

    /// Open devices and services, degrading each one that fails
    fn from_config(config: &Config) -> Self {
        if !config.voice.enabled {
            tracing::info!("voice disabled, alerts will be silent");
            return Self::disabled();
        }

        let sink: Arc<dyn AudioSink> = match CpalSink::new() {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                tracing::warn!(error = %e, "no speaker available, alerts will be silent");
                Arc::new(SilentSink)
            }
        };

        let source: Arc<dyn AudioSource> = match CpalSource::check_device() {
            Ok(()) => Arc::new(CpalSource::new(config.echo.vad_energy_threshold)),
            Err(e) => {
                tracing::warn!(error = %e, "no microphone available, cannot hear the driver");
                Arc::new(SilentSource)
            }
        };

        let transcriber: Arc<dyn Transcriber> =
            match SpeechToText::from_config(&config.voice, &config.api_keys) {
                Ok(stt) => Arc::new(stt),
                Err(e) => {
                    tracing::warn!(error = %e, "STT unavailable");
                    Arc::new(NullTranscriber)
                }
            };

        let synthesizer: Arc<dyn Synthesizer> =
            match TextToSpeech::from_config(&config.voice, &config.api_keys) {
                Ok(tts) => Arc::new(tts),
                Err(e) => {
                    tracing::warn!(error = %e, "TTS unavailable");
                    Arc::new(NullSynthesizer)
                }
            };

        Self {
            sink,
            source,
            transcriber,
            synthesizer,
        }
    }
}

/// Build the reasoning client, or a stand-in that always falls back
#[must_use]
pub fn reasoning_service(config: &Config) -> Arc<dyn ReasoningService> {
    match GeminiClient::from_config(&config.reasoning, &config.api_keys) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "reasoning service unavailable, using fallback prompts");
            Arc::new(OfflineReasoner)
        }
    }
}

/// The Nocturne daemon
pub struct Daemon {
    port: u16,
    alerts: Arc<AlertStateMachine>,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// # Errors
    ///
    /// Returns error if the data directory cannot be created
    pub async fn new(config: Config, port: u16) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let voice = VoiceStack::from_config(&config);
        let engine = ConversationEngine::new(
            ContextStore::json_file(&config.context_path),
            reasoning_service(&config),
            config.messages.clone(),
        );

        let services = AlertServices {
            sink: voice.sink,
            source: voice.source,
            transcriber: voice.transcriber,
            synthesizer: voice.synthesizer,
            engine,
        };
        let alerts = AlertStateMachine::start(&config, services, StatusBoard::new()).await;

        Ok(Self {
            port,
            alerts: Arc::new(alerts),
        })
    }

    #[must_use]
    pub fn alerts(&self) -> Arc<AlertStateMachine> {
        Arc::clone(&self.alerts)
    }

    /// Serve the control API until Ctrl-C, then shut the subsystem down
    ///
    /// # Errors
    ///
    /// Returns error if the API server fails
    pub async fn run(self) -> Result<()> {
        let shutdown = CancellationToken::new();

        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            signal.cancel();
        });

        let stop = shutdown.clone();
        let mut server = ApiServer::new(ApiState::new(Arc::clone(&self.alerts)), self.port)
            .spawn(async move { stop.cancelled().await });

        let result = tokio::select! {
            () = shutdown.cancelled() => (&mut server).await,
            joined = &mut server => joined,
        };

        self.alerts.shutdown().await;

        match result {
            Ok(served) => served,
            Err(e) => Err(crate::Error::Config(format!("API server task failed: {e}"))),
        }
    }
}
