//! TOML configuration file loading
//!
//! Supports `~/.config/nocturne/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NocturneConfigFile {
    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Reasoning service configuration
    #[serde(default)]
    pub reasoning: ReasoningFileConfig,

    /// Spoken alert texts
    #[serde(default)]
    pub messages: MessagesFileConfig,

    /// Listening loop timing
    #[serde(default)]
    pub listener: ListenerFileConfig,

    /// Echo filter thresholds
    #[serde(default)]
    pub echo: EchoFileConfig,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable microphone and speaker
    pub enabled: Option<bool>,

    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS provider ("openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// Playback gain (0.0 to 1.0)
    pub volume: Option<f32>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
    pub gemini: Option<String>,
}

/// Reasoning service configuration
#[derive(Debug, Default, Deserialize)]
pub struct ReasoningFileConfig {
    /// `generateContent` endpoint URL
    pub url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Sampling temperature
    pub temperature: Option<f32>,
}

/// Spoken alert texts
#[derive(Debug, Default, Deserialize)]
pub struct MessagesFileConfig {
    pub normal: Option<String>,
    pub extreme: Option<String>,
    pub no_face: Option<String>,
    pub confirmation: Option<String>,
    pub fallback: Option<String>,
}

/// Listening loop timing, in milliseconds
#[derive(Debug, Default, Deserialize)]
pub struct ListenerFileConfig {
    pub settle_delay_ms: Option<u64>,
    pub record_ceiling_ms: Option<u64>,
    pub speech_start_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub shutdown_timeout_ms: Option<u64>,
}

/// Echo filter thresholds
#[derive(Debug, Default, Deserialize)]
pub struct EchoFileConfig {
    pub recency_window_ms: Option<u64>,
    pub recency_prior: Option<f32>,
    pub overlap_threshold: Option<f32>,
    pub overlap_boost: Option<f32>,
    pub short_message_words: Option<usize>,
    pub short_overlap_floor: Option<f32>,
    pub short_message_penalty: Option<f32>,
    pub attention_discount: Option<f32>,
    pub decision_threshold: Option<f32>,
    pub attention_words: Option<Vec<String>>,
    pub vad_enabled: Option<bool>,
    pub vad_energy_threshold: Option<f32>,
    pub min_voice_ratio: Option<f32>,
    pub frame_size: Option<usize>,
    pub max_reference_chunks: Option<usize>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Control API port
    pub port: Option<u16>,

    /// Path to the conversation context document
    pub context_path: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `NocturneConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> NocturneConfigFile {
    let Some(path) = config_file_path() else {
        return NocturneConfigFile::default();
    };

    if !path.exists() {
        return NocturneConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config_file(&content).unwrap_or_else(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            NocturneConfigFile::default()
        }),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            NocturneConfigFile::default()
        }
    }
}

/// Parse a TOML config document
///
/// # Errors
///
/// Returns error if the document is not valid TOML for this schema
pub fn parse_config_file(content: &str) -> crate::Result<NocturneConfigFile> {
    let config = toml::from_str(content)?;
    tracing::info!("loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/nocturne/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("nocturne").join("config.toml"))
}
