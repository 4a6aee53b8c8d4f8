//! Configuration management for Nocturne

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Nocturne configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (context document, generated audio)
    pub data_dir: PathBuf,

    /// Path to the persisted conversation context document
    pub context_path: PathBuf,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Reasoning service configuration
    pub reasoning: ReasoningConfig,

    /// Spoken alert texts
    pub messages: AlertMessages,

    /// Listening loop timing
    pub listener: ListenerConfig,

    /// Echo filter thresholds
    pub echo: EchoConfig,

    /// Control API port
    pub port: u16,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable microphone and speaker
    pub enabled: bool,

    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: String,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// TTS provider ("openai" or "elevenlabs")
    pub tts_provider: String,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// Playback gain applied to every clip
    pub volume: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stt_provider: "whisper".to_string(),
            stt_model: "whisper-1".to_string(),
            tts_provider: "openai".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
            volume: 0.8,
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper and TTS)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,

    /// Gemini API key (reasoning service)
    pub gemini: Option<String>,
}

/// Reasoning service configuration
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    /// `generateContent` endpoint URL
    pub url: String,

    /// Request timeout
    pub timeout: Duration,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
                .to_string(),
            timeout: Duration::from_secs(10),
            temperature: 0.2,
        }
    }
}

/// Texts spoken by the system
#[derive(Debug, Clone)]
pub struct AlertMessages {
    /// Normal drowsiness alert
    pub normal: String,

    /// Extreme drowsiness alert
    pub extreme: String,

    /// One-shot alert when the classifier sees no face
    pub no_face: String,

    /// Spoken once the driver is judged alert
    pub confirmation: String,

    /// Spoken when the reasoning service gives no usable answer
    pub fallback: String,
}

impl Default for AlertMessages {
    fn default() -> Self {
        Self {
            normal: "Hey, are you awake?".to_string(),
            extreme: "Alert! Wake up now!".to_string(),
            no_face: "No face detected! Please position yourself in front of the camera."
                .to_string(),
            confirmation: "You seem alert now. Drive safely.".to_string(),
            fallback: "I'm not convinced you're fully alert. Please continue focusing.".to_string(),
        }
    }
}

/// Listening loop timing
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Pause after playback ends before recording starts
    pub settle_delay: Duration,

    /// Hard ceiling on one recording window
    pub record_ceiling: Duration,

    /// Give up on a window if no speech starts within this time
    pub speech_start_timeout: Duration,

    /// Poll interval while waiting for playback to finish
    pub poll_interval: Duration,

    /// Bound on joining the listening task at shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(800),
            record_ceiling: Duration::from_secs(6),
            speech_start_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(1),
        }
    }
}

/// Echo filter thresholds
#[derive(Debug, Clone)]
pub struct EchoConfig {
    /// Utterances this soon after system audio start out suspicious
    pub recency_window: Duration,

    /// Echo probability seeded inside the recency window
    pub recency_prior: f32,

    /// Word overlap above which a message counts as echoed
    pub overlap_threshold: f32,

    /// Probability added per echoed message
    pub overlap_boost: f32,

    /// Messages with fewer words than this are "short"
    pub short_message_words: usize,

    /// Short messages need at least this overlap to count
    pub short_overlap_floor: f32,

    /// Probability removed for an inconclusive short overlap
    pub short_message_penalty: f32,

    /// Probability removed when the driver used an attention word
    pub attention_discount: f32,

    /// Echo if the accumulated probability exceeds this
    pub decision_threshold: f32,

    /// Words a driver says that the system is unlikely to
    pub attention_words: Vec<String>,

    /// Whether voice-activity gating runs at all
    pub vad_enabled: bool,

    /// RMS energy above which a frame counts as voiced
    pub vad_energy_threshold: f32,

    /// Minimum share of voiced frames for a window to be kept
    pub min_voice_ratio: f32,

    /// Samples per VAD frame (20 ms at 16 kHz)
    pub frame_size: usize,

    /// Bound on the echo reference buffer, in chunks
    pub max_reference_chunks: usize,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            recency_window: Duration::from_secs(2),
            recency_prior: 0.8,
            overlap_threshold: 0.5,
            overlap_boost: 0.3,
            short_message_words: 3,
            short_overlap_floor: 0.8,
            short_message_penalty: 0.2,
            attention_discount: 0.3,
            decision_threshold: 0.5,
            attention_words: [
                "yes", "okay", "i'm", "sure", "hey", "hi", "hello", "awake", "focused",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            vad_enabled: true,
            vad_energy_threshold: 0.03,
            min_voice_ratio: 0.3,
            frame_size: 320,
            max_reference_chunks: 256,
        }
    }
}

impl Config {
    /// Load configuration from environment, config file and defaults
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn load() -> Result<Self> {
        Self::load_with_options(false)
    }

    /// Load configuration with explicit voice disable option
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn load_with_options(disable_voice: bool) -> Result<Self> {
        Self::from_file(file::load_config_file(), disable_voice)
    }

    /// Build configuration from a parsed file overlay (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn from_file(fc: file::NocturneConfigFile, disable_voice: bool) -> Result<Self> {
        if disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
        }

        // Data directory (~/.local/share/nocturne on Linux)
        let data_dir = std::env::var("NOCTURNE_DATA_DIR").map_or_else(
            |_| {
                directories::BaseDirs::new()
                    .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("nocturne"))
            },
            PathBuf::from,
        );

        std::fs::create_dir_all(&data_dir).ok();

        let context_path = std::env::var("NOCTURNE_CONTEXT_PATH")
            .ok()
            .or(fc.server.context_path)
            .map_or_else(|| data_dir.join("context.json"), PathBuf::from);

        let api_keys = ApiKeys {
            openai: std::env::var("OPENAI_API_KEY").ok().or(fc.api_keys.openai),
            deepgram: std::env::var("DEEPGRAM_API_KEY")
                .ok()
                .or(fc.api_keys.deepgram),
            elevenlabs: std::env::var("ELEVENLABS_API_KEY")
                .ok()
                .or(fc.api_keys.elevenlabs),
            gemini: std::env::var("GEMINI_API_KEY").ok().or(fc.api_keys.gemini),
        };

        let default_voice = VoiceConfig::default();
        let voice = VoiceConfig {
            enabled: !disable_voice && fc.voice.enabled.unwrap_or(default_voice.enabled),
            stt_provider: std::env::var("NOCTURNE_STT_PROVIDER")
                .ok()
                .or(fc.voice.stt_provider)
                .unwrap_or(default_voice.stt_provider),
            stt_model: std::env::var("NOCTURNE_STT_MODEL")
                .ok()
                .or(fc.voice.stt_model)
                .unwrap_or(default_voice.stt_model),
            tts_provider: std::env::var("NOCTURNE_TTS_PROVIDER")
                .ok()
                .or(fc.voice.tts_provider)
                .unwrap_or(default_voice.tts_provider),
            tts_model: std::env::var("NOCTURNE_TTS_MODEL")
                .ok()
                .or(fc.voice.tts_model)
                .unwrap_or(default_voice.tts_model),
            tts_voice: fc.voice.tts_voice.unwrap_or(default_voice.tts_voice),
            tts_speed: fc.voice.tts_speed.unwrap_or(default_voice.tts_speed),
            volume: fc
                .voice
                .volume
                .unwrap_or(default_voice.volume)
                .clamp(0.0, 1.0),
        };

        if !matches!(voice.stt_provider.as_str(), "whisper" | "deepgram") {
            return Err(Error::Config(format!(
                "unknown STT provider: {}",
                voice.stt_provider
            )));
        }
        if !matches!(voice.tts_provider.as_str(), "openai" | "elevenlabs") {
            return Err(Error::Config(format!(
                "unknown TTS provider: {}",
                voice.tts_provider
            )));
        }

        let default_reasoning = ReasoningConfig::default();
        let reasoning = ReasoningConfig {
            url: std::env::var("NOCTURNE_REASONING_URL")
                .ok()
                .or(fc.reasoning.url)
                .unwrap_or(default_reasoning.url),
            timeout: fc
                .reasoning
                .timeout_secs
                .map_or(default_reasoning.timeout, Duration::from_secs),
            temperature: fc
                .reasoning
                .temperature
                .unwrap_or(default_reasoning.temperature),
        };

        let default_messages = AlertMessages::default();
        let messages = AlertMessages {
            normal: fc.messages.normal.unwrap_or(default_messages.normal),
            extreme: fc.messages.extreme.unwrap_or(default_messages.extreme),
            no_face: fc.messages.no_face.unwrap_or(default_messages.no_face),
            confirmation: fc
                .messages
                .confirmation
                .unwrap_or(default_messages.confirmation),
            fallback: fc.messages.fallback.unwrap_or(default_messages.fallback),
        };

        let default_listener = ListenerConfig::default();
        let ms = |v: Option<u64>, d: Duration| v.map_or(d, Duration::from_millis);
        let listener = ListenerConfig {
            settle_delay: ms(fc.listener.settle_delay_ms, default_listener.settle_delay),
            record_ceiling: ms(fc.listener.record_ceiling_ms, default_listener.record_ceiling),
            speech_start_timeout: ms(
                fc.listener.speech_start_timeout_ms,
                default_listener.speech_start_timeout,
            ),
            poll_interval: ms(fc.listener.poll_interval_ms, default_listener.poll_interval),
            shutdown_timeout: ms(
                fc.listener.shutdown_timeout_ms,
                default_listener.shutdown_timeout,
            ),
        };

        let d = EchoConfig::default();
        let e = fc.echo;
        let echo = EchoConfig {
            recency_window: ms(e.recency_window_ms, d.recency_window),
            recency_prior: e.recency_prior.unwrap_or(d.recency_prior),
            overlap_threshold: e.overlap_threshold.unwrap_or(d.overlap_threshold),
            overlap_boost: e.overlap_boost.unwrap_or(d.overlap_boost),
            short_message_words: e.short_message_words.unwrap_or(d.short_message_words),
            short_overlap_floor: e.short_overlap_floor.unwrap_or(d.short_overlap_floor),
            short_message_penalty: e.short_message_penalty.unwrap_or(d.short_message_penalty),
            attention_discount: e.attention_discount.unwrap_or(d.attention_discount),
            decision_threshold: e.decision_threshold.unwrap_or(d.decision_threshold),
            attention_words: e
                .attention_words
                .map(|words| words.into_iter().map(|w| w.to_lowercase()).collect())
                .unwrap_or(d.attention_words),
            vad_enabled: e.vad_enabled.unwrap_or(d.vad_enabled),
            vad_energy_threshold: e.vad_energy_threshold.unwrap_or(d.vad_energy_threshold),
            min_voice_ratio: e.min_voice_ratio.unwrap_or(d.min_voice_ratio),
            frame_size: e.frame_size.unwrap_or(d.frame_size).max(1),
            max_reference_chunks: e.max_reference_chunks.unwrap_or(d.max_reference_chunks),
        };

        let port = std::env::var("NOCTURNE_API_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .or(fc.server.port)
            .unwrap_or(18800);

        Ok(Self {
            data_dir,
            context_path,
            voice,
            api_keys,
            reasoning,
            messages,
            listener,
            echo,
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overlay_applies() {
        let fc = file::parse_config_file(
            r#"
            [voice]
            volume = 3.0
            tts_voice = "nova"

            [listener]
            settle_delay_ms = 250

            [echo]
            attention_words = ["YES", "Yep"]
            frame_size = 0

            [messages]
            normal = "Still with me?"
            "#,
        )
        .unwrap();

        let config = Config::from_file(fc, true).unwrap();
        assert!(!config.voice.enabled);
        assert!((config.voice.volume - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.voice.tts_voice, "nova");
        assert_eq!(config.listener.settle_delay, Duration::from_millis(250));
        assert_eq!(config.listener.record_ceiling, Duration::from_secs(6));
        assert_eq!(config.echo.attention_words, vec!["yes", "yep"]);
        assert_eq!(config.echo.frame_size, 1);
        assert_eq!(config.messages.normal, "Still with me?");
        assert_eq!(config.messages.extreme, "Alert! Wake up now!");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let fc = file::parse_config_file("[voice]\ntts_provider = \"espeak\"").unwrap();
        assert!(matches!(
            Config::from_file(fc, false),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn echo_defaults_match_documented_thresholds() {
        let echo = EchoConfig::default();
        assert_eq!(echo.recency_window, Duration::from_secs(2));
        assert!((echo.min_voice_ratio - 0.3).abs() < f32::EPSILON);
        assert_eq!(echo.frame_size, 320);
        assert!(echo.attention_words.iter().any(|w| w == "awake"));
    }
}
