//! Text-to-speech over hosted synthesis services

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{AudioClip, Synthesizer, http};
use crate::config::{ApiKeys, VoiceConfig};
use crate::{Error, Result};

/// Upper bound on one synthesis request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const OPENAI_URL: &str = "https://api.openai.com/v1/audio/speech";
const ELEVENLABS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

#[derive(Clone, Copy, Debug, PartialEq)]
enum Backend {
    OpenAi { speed: f32 },
    ElevenLabs,
}

impl Backend {
    const fn name(self) -> &'static str {
        match self {
            Self::OpenAi { .. } => "openai",
            Self::ElevenLabs => "elevenlabs",
        }
    }

    /// Both services answer with MP3 bytes
    fn request(
        self,
        client: &reqwest::Client,
        api_key: &str,
        voice: &str,
        model: &str,
        text: &str,
    ) -> reqwest::RequestBuilder {
        match self {
            Self::OpenAi { speed } => client.post(OPENAI_URL).bearer_auth(api_key).json(&json!({
                "model": model,
                "input": text,
                "voice": voice,
                "speed": speed,
            })),
            Self::ElevenLabs => client
                .post(format!("{ELEVENLABS_URL}/{voice}"))
                .header("xi-api-key", api_key)
                .json(&json!({
                    "text": text,
                    "model_id": model,
                })),
        }
    }
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    model: String,
    backend: Backend,
}

impl TextToSpeech {
    /// Build the provider named in the voice config
    ///
    /// # Errors
    ///
    /// Returns error if the provider is unknown or its API key is missing
    pub fn from_config(voice: &VoiceConfig, keys: &ApiKeys) -> Result<Self> {
        match voice.tts_provider.as_str() {
            "openai" => Self::new_openai_with_model(
                keys.openai.clone().unwrap_or_default(),
                voice.tts_voice.clone(),
                voice.tts_speed,
                voice.tts_model.clone(),
            ),
            "elevenlabs" => Self::new_elevenlabs_with_model(
                keys.elevenlabs.clone().unwrap_or_default(),
                voice.tts_voice.clone(),
                voice.tts_model.clone(),
            ),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }

    /// Speak through `OpenAI` with the given voice, speed and model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai_with_model(
        api_key: String,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        Self::with_backend(Backend::OpenAi { speed }, api_key, voice, model)
    }

    /// Speak through ElevenLabs with the given voice id and model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs_with_model(
        api_key: String,
        voice_id: String,
        model: String,
    ) -> Result<Self> {
        Self::with_backend(Backend::ElevenLabs, api_key, voice_id, model)
    }

    fn with_backend(
        backend: Backend,
        api_key: String,
        voice: String,
        model: String,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!(
                "{} speech needs an API key",
                backend.name()
            )));
        }

        Ok(Self {
            client: http::client(REQUEST_TIMEOUT),
            api_key,
            voice,
            model,
            backend,
        })
    }

    /// Synthesize text to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize_mp3(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(backend = self.backend.name(), chars = text.len(), "synthesizing speech");

        let request = self.backend.request(
            &self.client,
            &self.api_key,
            &self.voice,
            &self.model,
            text,
        );
        http::fetch(request, self.backend.name(), Error::Tts).await
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let mp3 = self.synthesize_mp3(text).await?;
        let clip = AudioClip::from_mp3(&mp3)?;
        if clip.is_empty() {
            return Err(Error::Tts("service returned no audio".to_string()));
        }
        Ok(clip)
    }
}
