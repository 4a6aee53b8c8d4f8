//! Remote reasoning service that judges driver alertness

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::alert::DrowsinessLevel;
use crate::config::{ApiKeys, ReasoningConfig};
use crate::{Error, Result};

/// Everything the service sees for one driver answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningRequest {
    pub level: DrowsinessLevel,
    /// Compact summary of the driver profile and recent turns
    pub summary: String,
    /// Topic to steer the next prompt towards; may be empty
    pub topic: String,
    pub transcript: String,
}

/// Request/response oracle for alertness verdicts
///
/// Returns the raw model text; validating its shape is the caller's job.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the service is unreachable or answers with an error
    async fn evaluate(&self, request: &ReasoningRequest) -> Result<String>;
}

/// Stand-in used when no reasoning backend is configured
pub struct OfflineReasoner;

#[async_trait]
impl ReasoningService for OfflineReasoner {
    async fn evaluate(&self, _request: &ReasoningRequest) -> Result<String> {
        Err(Error::Reasoning(
            "no reasoning service configured".to_string(),
        ))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    temperature: f32,
    timeout: Duration,
}

impl GeminiClient {
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(url: String, api_key: String, temperature: f32, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Gemini API key required".to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url,
            api_key,
            temperature,
            timeout,
        })
    }

    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn from_config(config: &ReasoningConfig, keys: &ApiKeys) -> Result<Self> {
        Self::new(
            config.url.clone(),
            keys.gemini.clone().unwrap_or_default(),
            config.temperature,
            config.timeout,
        )
    }
}

#[async_trait]
impl ReasoningService for GeminiClient {
    async fn evaluate(&self, request: &ReasoningRequest) -> Result<String> {
        let prompt = build_prompt(request);
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: 0.8,
                top_k: 40,
            },
        };

        tracing::debug!(level = %request.level, "sending answer to reasoning service");

        let send = self
            .client
            .post(&self.url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| Error::Reasoning("request timed out".to_string()))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "reasoning service error");
            return Err(Error::Reasoning(format!("API error {status}: {body}")));
        }

        let parsed: GenerateResponse = response.json().await?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| Error::Reasoning("response had no candidates".to_string()))
    }
}

/// Render the instruction sent to the model
#[must_use]
pub fn build_prompt(request: &ReasoningRequest) -> String {
    let mut prompt = format!(
        "You are an in-car assistant checking whether a drowsy driver is alert.\n\n\
         Drowsiness level reported by the camera: {level}\n\
         Driver's spoken answer: \"{transcript}\"\n",
        level = request.level,
        transcript = request.transcript,
    );

    if !request.summary.is_empty() {
        prompt.push_str("\nWhat you know about the driver:\n");
        prompt.push_str(&request.summary);
        prompt.push('\n');
    }
    if !request.topic.is_empty() {
        prompt.push_str(&format!(
            "\nThe driver has enjoyed talking about: {}. You may bring it up.\n",
            request.topic
        ));
    }

    prompt.push_str(
        "\nDecide whether the answer convincingly shows the driver is alert.\n\
         Reply with a single JSON object and nothing else:\n\
         - \"convinced\": true or false\n\
         - \"message\": when not convinced, a short, friendly spoken reply that keeps \
         the driver talking (a question works well)\n\
         - \"topic\": a short topic the driver showed interest in, or \"\" if none\n\n\
         Examples:\n\
         {\"convinced\": true, \"topic\": \"\"}\n\
         {\"convinced\": false, \"message\": \"You sound tired. What was the last exit you passed?\", \"topic\": \"road trips\"}\n",
    );

    prompt
}
