//! Shared test utilities: scripted stand-ins for devices and services

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use nocturne::alert::{AlertChannel, AlertServices, AlertStateMachine};
use nocturne::config::{
    AlertMessages, ApiKeys, EchoConfig, ListenerConfig, ReasoningConfig, VoiceConfig,
};
use nocturne::context::ContextStore;
use nocturne::conversation::{ConversationEngine, ReasoningRequest, ReasoningService};
use nocturne::voice::{AudioClip, AudioSink, AudioSource, RecordWindow, Synthesizer, Transcriber};
use nocturne::{Config, Error, Result, StatusBoard};

/// Config with timings short enough for tests
pub fn test_config(dir: &Path) -> Config {
    Config {
        data_dir: dir.to_path_buf(),
        context_path: dir.join("context.json"),
        voice: VoiceConfig {
            volume: 1.0,
            ..VoiceConfig::default()
        },
        api_keys: ApiKeys::default(),
        reasoning: ReasoningConfig::default(),
        messages: AlertMessages::default(),
        listener: ListenerConfig {
            settle_delay: Duration::from_millis(10),
            record_ceiling: Duration::from_millis(200),
            speech_start_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
            shutdown_timeout: Duration::from_millis(500),
        },
        echo: EchoConfig::default(),
        port: 0,
    }
}

/// One second of clearly voiced audio at 16kHz
pub fn speech() -> Vec<f32> {
    #[allow(clippy::cast_precision_loss)]
    (0..16000).map(|i| 0.5 * (i as f32 * 0.2).sin()).collect()
}

/// Audio where only `voiced` of every ten 20ms frames carry speech
pub fn sparse_speech(voiced: usize) -> Vec<f32> {
    let mut samples = Vec::new();
    for frame in 0..50 {
        let amplitude = if frame % 10 < voiced { 0.5 } else { 0.0 };
        #[allow(clippy::cast_precision_loss)]
        samples.extend((0..320).map(|i| amplitude * (i as f32 * 0.2).sin()));
    }
    samples
}

/// Output sink that plays each clip for a fixed time
pub struct RecordingSink {
    play_time: Duration,
    playing: Mutex<HashMap<AlertChannel, Instant>>,
    started: Mutex<Vec<AlertChannel>>,
    overlaps: Mutex<usize>,
    prepared: Mutex<usize>,
}

impl RecordingSink {
    pub fn new(play_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            play_time,
            playing: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
            overlaps: Mutex::new(0),
            prepared: Mutex::new(0),
        })
    }

    /// Clips converted for playback so far
    pub fn prepared(&self) -> usize {
        *self.prepared.lock().unwrap()
    }

    /// Channels in the order playback started
    pub fn started(&self) -> Vec<AlertChannel> {
        self.started.lock().unwrap().clone()
    }

    pub fn count(&self, channel: AlertChannel) -> usize {
        self.started().iter().filter(|c| **c == channel).count()
    }

    /// Times two exclusive channels were audible together
    pub fn overlaps(&self) -> usize {
        *self.overlaps.lock().unwrap()
    }

    pub fn busy_exclusive(&self) -> usize {
        AlertChannel::EXCLUSIVE
            .into_iter()
            .filter(|c| self.is_busy(*c))
            .count()
    }
}

impl AudioSink for RecordingSink {
    fn start(&self, channel: AlertChannel, _clip: &AudioClip) -> Result<()> {
        self.playing
            .lock()
            .unwrap()
            .insert(channel, Instant::now() + self.play_time);
        self.started.lock().unwrap().push(channel);
        if self.busy_exclusive() > 1 {
            *self.overlaps.lock().unwrap() += 1;
        }
        Ok(())
    }

    fn stop(&self, channel: AlertChannel) {
        self.playing.lock().unwrap().remove(&channel);
    }

    fn is_busy(&self, channel: AlertChannel) -> bool {
        self.playing
            .lock()
            .unwrap()
            .get(&channel)
            .is_some_and(|until| Instant::now() < *until)
    }

    fn prepare(&self, clip: AudioClip) -> Result<AudioClip> {
        *self.prepared.lock().unwrap() += 1;
        Ok(clip)
    }
}

/// Microphone that returns scripted windows, then waits to be cancelled
pub struct ScriptedSource {
    windows: Mutex<VecDeque<Vec<f32>>>,
    recordings: Mutex<usize>,
    take_time: Duration,
}

impl ScriptedSource {
    pub fn new(windows: Vec<Vec<f32>>) -> Arc<Self> {
        Self::slow(windows, Duration::ZERO)
    }

    /// Source whose every scripted window takes `take_time` to record
    pub fn slow(windows: Vec<Vec<f32>>, take_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            windows: Mutex::new(windows.into()),
            recordings: Mutex::new(0),
            take_time,
        })
    }

    pub fn recordings(&self) -> usize {
        *self.recordings.lock().unwrap()
    }
}

#[async_trait]
impl AudioSource for ScriptedSource {
    async fn record(&self, _window: RecordWindow, cancel: CancellationToken) -> Result<Vec<f32>> {
        *self.recordings.lock().unwrap() += 1;
        let next = self.windows.lock().unwrap().pop_front();
        match next {
            Some(samples) => {
                tokio::select! {
                    () = cancel.cancelled() => Ok(Vec::new()),
                    () = tokio::time::sleep(self.take_time) => Ok(samples),
                }
            }
            None => {
                cancel.cancelled().await;
                Ok(Vec::new())
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        16000
    }
}

/// Transcriber that replays a script; empty once exhausted
pub struct ScriptedTranscriber {
    transcripts: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<usize>,
}

impl ScriptedTranscriber {
    pub fn new(transcripts: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            transcripts: Mutex::new(transcripts.into()),
            calls: Mutex::new(0),
        })
    }

    pub fn saying(texts: &[&str]) -> Arc<Self> {
        Self::new(texts.iter().map(|t| Ok((*t).to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _samples: &[f32], _sample_rate: u32) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        self.transcripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Reasoning service that replays raw replies and records requests
pub struct ScriptedReasoner {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<ReasoningRequest>>,
    delay: Duration,
}

impl ScriptedReasoner {
    pub fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        Self::slow(replies, Duration::ZERO)
    }

    /// Reasoner that thinks for `delay` before every reply
    pub fn slow(replies: Vec<Result<String>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            delay,
        })
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn evaluate(&self, request: &ReasoningRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.delay).await;
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Reasoning("unreachable".to_string())))
    }
}

/// Synthesizer producing a short tone and remembering what it said
#[derive(Default)]
pub struct FakeSynth {
    spoken: Mutex<Vec<String>>,
}

impl FakeSynth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynth {
    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(AudioClip::new(vec![0.2; 2400], 24000))
    }
}

/// Handles onto every fake behind a running state machine
pub struct Harness {
    pub machine: Arc<AlertStateMachine>,
    pub sink: Arc<RecordingSink>,
    pub source: Arc<ScriptedSource>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub reasoner: Arc<ScriptedReasoner>,
    pub synth: Arc<FakeSynth>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub async fn start(
        windows: Vec<Vec<f32>>,
        transcripts: Arc<ScriptedTranscriber>,
        replies: Vec<Result<String>>,
    ) -> Self {
        Self::start_with(
            ScriptedSource::new(windows),
            transcripts,
            ScriptedReasoner::new(replies),
            |_| {},
        )
        .await
    }

    pub async fn start_with(
        source: Arc<ScriptedSource>,
        transcripts: Arc<ScriptedTranscriber>,
        reasoner: Arc<ScriptedReasoner>,
        tweak: impl FnOnce(&mut Config),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        tweak(&mut config);

        let sink = RecordingSink::new(Duration::from_millis(30));
        let synth = FakeSynth::new();

        let engine = ConversationEngine::new(
            ContextStore::json_file(&config.context_path),
            Arc::clone(&reasoner) as Arc<dyn ReasoningService>,
            config.messages.clone(),
        );

        let services = AlertServices {
            sink: Arc::clone(&sink) as Arc<dyn AudioSink>,
            source: Arc::clone(&source) as Arc<dyn AudioSource>,
            transcriber: Arc::clone(&transcripts) as Arc<dyn Transcriber>,
            synthesizer: Arc::clone(&synth) as Arc<dyn Synthesizer>,
            engine,
        };
        let machine = AlertStateMachine::start(&config, services, StatusBoard::new()).await;

        Self {
            machine: Arc::new(machine),
            sink,
            source,
            transcriber: transcripts,
            reasoner,
            synth,
            dir,
        }
    }

    pub fn context_path(&self) -> std::path::PathBuf {
        self.dir.path().join("context.json")
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
