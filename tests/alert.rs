//! End-to-end behaviour of the alert state machine with scripted devices

mod common;

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::{
    Harness, ScriptedReasoner, ScriptedSource, ScriptedTranscriber, eventually, sparse_speech,
    speech,
};
use nocturne::alert::{AlertChannel, DrowsinessLevel, SystemAlertState};
use nocturne::config::AlertMessages;
use nocturne::status::AlertStatus;
use nocturne::voice::AudioSink;

const CONVINCED: &str = r#"{"convinced": true, "topic": "coffee"}"#;

#[tokio::test]
async fn escalation_ends_when_driver_convinces_service() {
    let h = Harness::start_with(
        ScriptedSource::new(vec![speech()]),
        ScriptedTranscriber::saying(&["yes I'm awake"]),
        ScriptedReasoner::new(vec![Ok(CONVINCED.to_string())]),
        |config| config.listener.settle_delay = Duration::from_millis(200),
    )
    .await;
    let messages = AlertMessages::default();

    h.machine.update(DrowsinessLevel::Awake);
    assert_eq!(h.machine.status().current(), AlertStatus::Awake);

    h.machine.update(DrowsinessLevel::Normal);
    assert_eq!(h.machine.state(), SystemAlertState::Normal);
    assert_eq!(h.machine.status().current(), AlertStatus::Normal);
    assert!(h.machine.is_listening());

    assert!(eventually(|| !h.sink.is_busy(AlertChannel::Normal)).await);
    h.machine.update(DrowsinessLevel::Extreme);
    assert_eq!(h.machine.state(), SystemAlertState::Extreme);
    assert_eq!(h.machine.status().current(), AlertStatus::Extreme);

    assert!(eventually(|| h.sink.count(AlertChannel::Conversation) == 1).await);
    assert!(eventually(|| h.machine.status().current() == AlertStatus::Awake).await);
    assert!(eventually(|| !h.machine.is_listening()).await);

    assert_eq!(h.machine.state(), SystemAlertState::Idle);
    assert_eq!(
        h.sink.started(),
        vec![
            AlertChannel::Normal,
            AlertChannel::Extreme,
            AlertChannel::Conversation
        ]
    );
    assert!(h.synth.spoken().contains(&messages.confirmation));
    assert_eq!(h.sink.overlaps(), 0);

    let requests = h.reasoner.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].transcript, "yes I'm awake");
    assert_eq!(requests[0].level, DrowsinessLevel::Extreme);
}

#[tokio::test]
async fn conversation_is_persisted_to_context_file() {
    let h = Harness::start(
        vec![speech()],
        ScriptedTranscriber::saying(&["yes I'm awake"]),
        vec![Ok(CONVINCED.to_string())],
    )
    .await;

    h.machine.update(DrowsinessLevel::Normal);
    assert!(eventually(|| h.machine.status().current() == AlertStatus::Awake
        && h.sink.count(AlertChannel::Conversation) == 1)
    .await);

    let raw = std::fs::read_to_string(h.context_path()).unwrap();
    let document: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(raw.contains("coffee"));
    assert!(raw.contains("yes I'm awake"));
    assert!(document.is_object());
}

#[tokio::test]
async fn unreachable_service_falls_back_and_keeps_listening() {
    let h = Harness::start(
        vec![speech(), speech()],
        ScriptedTranscriber::saying(&["hello there", "yes I am here"]),
        vec![],
    )
    .await;
    let fallback = AlertMessages::default().fallback;

    h.machine.update(DrowsinessLevel::Normal);

    assert!(eventually(|| h.reasoner.requests().len() == 2).await);
    assert!(eventually(|| h.sink.count(AlertChannel::Conversation) == 2).await);
    assert!(eventually(|| h.source.recordings() == 3).await);

    let spoken_fallbacks = h.synth.spoken().iter().filter(|s| **s == fallback).count();
    assert_eq!(spoken_fallbacks, 2);
    assert!(h.machine.is_listening());
    assert_eq!(h.machine.state(), SystemAlertState::Conversation);
    assert_eq!(h.machine.status().current(), AlertStatus::Listening);
    assert_eq!(h.sink.overlaps(), 0);
}

#[tokio::test]
async fn mostly_silent_window_never_reaches_transcription() {
    let h = Harness::start(
        vec![sparse_speech(2)],
        ScriptedTranscriber::saying(&["yes I'm awake"]),
        vec![Ok(CONVINCED.to_string())],
    )
    .await;

    h.machine.update(DrowsinessLevel::Normal);

    // Second recording only starts once the first window was dropped
    assert!(eventually(|| h.source.recordings() == 2).await);
    assert_eq!(h.transcriber.calls(), 0);
    assert!(h.reasoner.requests().is_empty());
    assert_eq!(h.machine.state(), SystemAlertState::Normal);
}

#[tokio::test]
async fn awake_cancels_listener_and_silences_channels() {
    let h = Harness::start(vec![], ScriptedTranscriber::saying(&[]), vec![]).await;

    h.machine.update(DrowsinessLevel::Normal);
    assert!(eventually(|| h.source.recordings() == 1).await);
    assert_eq!(h.machine.status().current(), AlertStatus::Listening);

    h.machine.update(DrowsinessLevel::Awake);

    assert_eq!(h.machine.state(), SystemAlertState::Idle);
    assert_eq!(h.machine.status().current(), AlertStatus::Awake);
    assert!(eventually(|| !h.machine.is_listening()).await);
    assert!(!h.machine.playback().any_busy());
    assert!(h.machine.echo().recent_messages().len() >= 2);
}

#[tokio::test]
async fn stale_verdict_is_discarded_after_reset() {
    let reply = r#"{"convinced": false, "message": "Tell me about your day"}"#;
    let h = Harness::start_with(
        ScriptedSource::new(vec![speech()]),
        ScriptedTranscriber::saying(&["hello there"]),
        ScriptedReasoner::slow(vec![Ok(reply.to_string())], Duration::from_millis(200)),
        |_| {},
    )
    .await;

    h.machine.update(DrowsinessLevel::Normal);
    assert!(eventually(|| h.reasoner.requests().len() == 1).await);

    h.machine.update(DrowsinessLevel::Awake);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!h.synth.spoken().iter().any(|s| s == "Tell me about your day"));
    assert_eq!(h.sink.count(AlertChannel::Conversation), 0);
    assert_eq!(h.machine.state(), SystemAlertState::Idle);
    assert_eq!(h.machine.status().current(), AlertStatus::Awake);
    assert!(!h.machine.is_listening());
}

#[tokio::test]
async fn stale_turn_is_not_persisted() {
    let reply = r#"{"convinced": false, "message": "What is that?", "topic": "sailing"}"#;
    let h = Harness::start_with(
        ScriptedSource::new(vec![speech()]),
        ScriptedTranscriber::saying(&["I like boats"]),
        ScriptedReasoner::slow(vec![Ok(reply.to_string())], Duration::from_millis(200)),
        |_| {},
    )
    .await;

    h.machine.update(DrowsinessLevel::Normal);
    assert!(eventually(|| h.reasoner.requests().len() == 1).await);

    h.machine.update(DrowsinessLevel::Awake);
    tokio::time::sleep(Duration::from_millis(400)).await;

    // Nothing from the abandoned turn reaches disk
    if let Ok(raw) = std::fs::read_to_string(h.context_path()) {
        assert!(!raw.contains("sailing"));
        assert!(!raw.contains("I like boats"));
    }
}

#[tokio::test]
async fn echo_recency_counts_from_recording_start() {
    let h = Harness::start_with(
        ScriptedSource::slow(vec![speech()], Duration::from_millis(500)),
        ScriptedTranscriber::saying(&["keep your eyes on the road"]),
        ScriptedReasoner::new(vec![Ok(CONVINCED.to_string())]),
        |config| {
            config.echo.recency_window = Duration::from_millis(300);
            config.messages.normal = "Please keep your eyes on the road ahead".to_string();
        },
    )
    .await;

    h.machine.update(DrowsinessLevel::Normal);

    // The window opened right after the prompt, so its transcript is echo
    // even though transcription finished outside the recency window
    assert!(eventually(|| h.source.recordings() == 2).await);
    assert_eq!(h.transcriber.calls(), 1);
    assert!(h.reasoner.requests().is_empty());
    assert_eq!(h.machine.state(), SystemAlertState::Normal);
}

#[tokio::test]
async fn alert_clips_are_prepared_once() {
    let h = Harness::start(vec![], ScriptedTranscriber::saying(&[]), vec![]).await;
    assert_eq!(h.sink.prepared(), 2);

    for level in [
        DrowsinessLevel::Normal,
        DrowsinessLevel::Awake,
        DrowsinessLevel::Normal,
    ] {
        h.machine.update(level);
        assert!(eventually(|| !h.sink.is_busy(AlertChannel::Normal)).await);
    }
    h.machine.update(DrowsinessLevel::Extreme);
    assert!(eventually(|| h.sink.count(AlertChannel::Extreme) == 1).await);

    assert_eq!(h.sink.count(AlertChannel::Normal), 2);
    assert_eq!(h.sink.prepared(), 2);
}

#[tokio::test]
async fn extreme_waits_for_normal_prompt_to_finish() {
    let h = Harness::start(vec![], ScriptedTranscriber::saying(&[]), vec![]).await;

    h.machine.update(DrowsinessLevel::Normal);
    h.machine.update(DrowsinessLevel::Extreme);

    assert_eq!(h.machine.state(), SystemAlertState::Normal);
    assert_eq!(h.sink.count(AlertChannel::Extreme), 0);
    assert_eq!(h.machine.level(), DrowsinessLevel::Extreme);
}

#[tokio::test]
async fn repeated_normal_does_not_replay_alert() {
    let h = Harness::start(vec![], ScriptedTranscriber::saying(&[]), vec![]).await;

    h.machine.update(DrowsinessLevel::Normal);
    h.machine.update(DrowsinessLevel::Normal);
    h.machine.update(DrowsinessLevel::Normal);

    assert_eq!(h.sink.count(AlertChannel::Normal), 1);
}

#[tokio::test]
async fn channels_stay_mutually_exclusive_under_random_levels() {
    let h = Harness::start(vec![], ScriptedTranscriber::saying(&[]), vec![]).await;
    let mut rng = StdRng::seed_from_u64(7);
    let levels = [
        DrowsinessLevel::Awake,
        DrowsinessLevel::Normal,
        DrowsinessLevel::Extreme,
    ];

    for _ in 0..60 {
        let level = levels[rng.gen_range(0..levels.len())];
        h.machine.update(level);

        let state = h.machine.state();
        let active = [
            state.normal_active(),
            state.extreme_active(),
            state.conversation_active(),
        ]
        .into_iter()
        .filter(|a| *a)
        .count();
        assert!(active <= 1, "{state:?} has {active} active views");
        assert!(h.sink.busy_exclusive() <= 1);

        tokio::time::sleep(Duration::from_millis(rng.gen_range(0..40))).await;
    }

    assert_eq!(h.sink.overlaps(), 0);
    h.machine.shutdown().await;
}

#[tokio::test]
async fn no_face_alert_plays_without_listening() {
    let h = Harness::start(vec![], ScriptedTranscriber::saying(&[]), vec![]).await;

    assert!(h.machine.no_face_alert(None).await);
    assert!(h.machine.no_face_alert(Some("   ")).await);
    assert!(h.machine.no_face_alert(Some("Look at the road")).await);

    assert_eq!(h.sink.count(AlertChannel::NoFace), 3);
    assert!(!h.machine.is_listening());
    assert_eq!(h.machine.state(), SystemAlertState::Idle);

    let no_face = AlertMessages::default().no_face;
    let spoken = h.synth.spoken();
    assert_eq!(spoken.iter().filter(|s| **s == no_face).count(), 2);
    assert!(spoken.iter().any(|s| s == "Look at the road"));
}

#[tokio::test]
async fn no_face_alert_does_not_interrupt_normal_alert() {
    let h = Harness::start(vec![], ScriptedTranscriber::saying(&[]), vec![]).await;

    h.machine.update(DrowsinessLevel::Normal);
    assert!(h.machine.no_face_alert(None).await);

    assert!(h.sink.is_busy(AlertChannel::Normal));
    assert_eq!(h.machine.state(), SystemAlertState::Normal);
}

#[tokio::test]
async fn shutdown_stops_listener_and_playback() {
    let h = Harness::start(vec![], ScriptedTranscriber::saying(&[]), vec![]).await;

    h.machine.update(DrowsinessLevel::Normal);
    assert!(h.machine.is_listening());

    tokio::time::timeout(Duration::from_secs(1), h.machine.shutdown())
        .await
        .unwrap();

    assert!(!h.machine.is_listening());
    assert!(!h.machine.playback().any_busy());
    assert_eq!(h.machine.state(), SystemAlertState::Idle);
}
