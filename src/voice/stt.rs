//! Speech-to-text over hosted transcription services

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;

use super::{Transcriber, http, samples_to_wav};
use crate::config::{ApiKeys, VoiceConfig};
use crate::{Error, Result};

/// Upper bound on one transcription request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    Whisper,
    Deepgram,
}

impl Backend {
    const fn name(self) -> &'static str {
        match self {
            Self::Whisper => "whisper",
            Self::Deepgram => "deepgram",
        }
    }

    /// Where the transcript sits in the response document
    const fn transcript_pointer(self) -> &'static str {
        match self {
            Self::Whisper => "/text",
            Self::Deepgram => "/results/channels/0/alternatives/0/transcript",
        }
    }

    fn request(
        self,
        client: &reqwest::Client,
        api_key: &str,
        model: &str,
        wav: Vec<u8>,
    ) -> Result<reqwest::RequestBuilder> {
        match self {
            Self::Whisper => {
                let file = reqwest::multipart::Part::bytes(wav)
                    .file_name("answer.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?;
                let form = reqwest::multipart::Form::new()
                    .part("file", file)
                    .text("model", model.to_string());
                Ok(client.post(WHISPER_URL).bearer_auth(api_key).multipart(form))
            }
            Self::Deepgram => Ok(client
                .post(DEEPGRAM_URL)
                .query(&[("model", model), ("punctuate", "true")])
                .header(header::AUTHORIZATION, format!("Token {api_key}"))
                .header(header::CONTENT_TYPE, "audio/wav")
                .body(wav)),
        }
    }

    /// Pull the transcript out of a response body
    ///
    /// A well-formed response without a transcript (Deepgram returns no
    /// alternatives for silence) yields an empty string.
    fn transcript(self, body: &[u8]) -> Result<String> {
        let document: serde_json::Value = serde_json::from_slice(body)?;
        let text = document
            .pointer(self.transcript_pointer())
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }
}

/// Transcribes recorded driver answers
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    backend: Backend,
}

impl SpeechToText {
    /// Build the provider named in the voice config
    ///
    /// # Errors
    ///
    /// Returns error if the provider is unknown or its API key is missing
    pub fn from_config(voice: &VoiceConfig, keys: &ApiKeys) -> Result<Self> {
        match voice.stt_provider.as_str() {
            "whisper" => Self::new_whisper(
                keys.openai.clone().unwrap_or_default(),
                voice.stt_model.clone(),
            ),
            "deepgram" => Self::new_deepgram(
                keys.deepgram.clone().unwrap_or_default(),
                voice.stt_model.clone(),
            ),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }

    /// Transcribe through `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: String, model: String) -> Result<Self> {
        Self::with_backend(Backend::Whisper, api_key, model)
    }

    /// Transcribe through Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_deepgram(api_key: String, model: String) -> Result<Self> {
        Self::with_backend(Backend::Deepgram, api_key, model)
    }

    fn with_backend(backend: Backend, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!(
                "{} transcription needs an API key",
                backend.name()
            )));
        }

        Ok(Self {
            client: http::client(REQUEST_TIMEOUT),
            api_key,
            model,
            backend,
        })
    }

    /// Transcribe WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is not JSON
    pub async fn transcribe_wav(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(backend = self.backend.name(), bytes = audio.len(), "transcribing");

        let request = self
            .backend
            .request(&self.client, &self.api_key, &self.model, audio.to_vec())?;
        let body = http::fetch(request, self.backend.name(), Error::Stt).await?;
        let transcript = self.backend.transcript(&body)?;

        tracing::debug!(%transcript, "transcription complete");
        Ok(transcript)
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }
        let wav = samples_to_wav(samples, sample_rate)?;
        self.transcribe_wav(&wav).await
    }
}
