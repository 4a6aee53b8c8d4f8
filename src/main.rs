use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nocturne::alert::{AlertChannel, DrowsinessLevel};
use nocturne::context::ContextStore;
use nocturne::conversation::ConversationEngine;
use nocturne::voice::{
    AudioClip, AudioSink, CpalSink, MicCapture, PLAYBACK_SAMPLE_RATE, Synthesizer, TextToSpeech,
    rms_energy,
};
use nocturne::{Config, Daemon};

/// Nocturne - keeps drowsy drivers talking until they are alert
#[derive(Parser)]
#[command(name = "nocturne", version, about)]
struct Cli {
    /// Port for the control API (overrides the config file)
    #[arg(long, env = "NOCTURNE_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (for machines without audio hardware)
    #[arg(long, env = "NOCTURNE_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hey, are you awake?")]
        text: String,
    },
    /// Run one conversational turn against the reasoning service
    Ask {
        /// What the driver said
        transcript: String,
        /// Drowsiness level to report
        #[arg(short, long, default_value = "NORMAL")]
        level: DrowsinessLevel,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,nocturne=info",
        1 => "info,nocturne=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
            Command::Ask { transcript, level } => ask(&transcript, level).await,
        };
    }

    let config = Config::load_with_options(cli.disable_voice)?;
    tracing::debug!(?config, "loaded configuration");

    let port = cli.port.unwrap_or(config.port);
    tracing::info!(
        port,
        voice = config.voice.enabled,
        context = %config.context_path.display(),
        "starting nocturne"
    );

    let daemon = Daemon::new(config, port).await?;
    tracing::info!("nocturne ready, waiting for drowsiness updates");

    // Run until interrupted
    daemon.run().await?;

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = MicCapture::open()?;
    capture.start()?;
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = rms_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Play a clip and block until it finishes
async fn play_to_end(sink: &CpalSink, clip: &AudioClip) -> anyhow::Result<()> {
    sink.start(AlertChannel::Conversation, clip)?;
    // Give the playback thread a moment to claim the device
    tokio::time::sleep(Duration::from_millis(100)).await;
    while sink.is_busy(AlertChannel::Conversation) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = CpalSink::new()?;

    let frequency = 440.0_f32;
    let num_samples = PLAYBACK_SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), PLAYBACK_SAMPLE_RATE);
    play_to_end(&sink, &AudioClip::new(samples, PLAYBACK_SAMPLE_RATE)).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output with the configured provider
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let tts = TextToSpeech::from_config(&config.voice, &config.api_keys)?;

    println!("Synthesizing speech with {}...", config.voice.tts_provider);
    let clip = tts.synthesize(text).await?;
    println!(
        "Got {:.1}s of audio at {} Hz",
        clip.duration().as_secs_f32(),
        clip.sample_rate()
    );

    println!("Playing audio...");
    let sink = CpalSink::new()?;
    play_to_end(&sink, &clip.with_gain(config.voice.volume)).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// One text-only turn through the conversation engine
async fn ask(transcript: &str, level: DrowsinessLevel) -> anyhow::Result<()> {
    let config = Config::load_with_options(true)?;
    let mut engine = ConversationEngine::new(
        ContextStore::json_file(&config.context_path),
        nocturne::daemon::reasoning_service(&config),
        config.messages.clone(),
    );

    let verdict = engine.evaluate(transcript, level).await;

    println!("convinced: {}", verdict.convinced);
    println!("message:   {}", verdict.message);
    if !verdict.topic.is_empty() {
        println!("topic:     {}", verdict.topic);
    }

    Ok(())
}
