//! Background listening loop
//!
//! One task per escalation. Each cycle waits for the speakers to go quiet,
//! records the driver, screens out the system's own voice and hands the
//! transcript to the conversation engine.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{AlertChannel, Shared};
use crate::Result;
use crate::status::AlertStatus;
use crate::voice::RecordWindow;

/// Outcome of one listening cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    /// Nothing usable was heard, or the driver is not convinced yet
    Continue,
    /// Driver confirmed awake
    Confirmed,
    /// Cancelled or superseded by a reset
    Stopped,
}

pub(super) async fn run(shared: Arc<Shared>, cancel: CancellationToken, generation: u64) {
    tracing::info!(generation, "listener started");

    loop {
        if cancel.is_cancelled() || !shared.is_current(generation) {
            break;
        }

        match listen_once(&shared, &cancel, generation).await {
            Ok(Cycle::Continue) => {}
            Ok(Cycle::Confirmed | Cycle::Stopped) => break,
            Err(e) => tracing::warn!(error = %e, "listening cycle failed, retrying"),
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(shared.listener.poll_interval) => {}
        }
    }

    tracing::info!(generation, "listener stopped");
}

async fn listen_once(
    shared: &Shared,
    cancel: &CancellationToken,
    generation: u64,
) -> Result<Cycle> {
    let config = &shared.listener;

    if !shared.playback.wait_idle(config.poll_interval, cancel).await {
        return Ok(Cycle::Stopped);
    }

    shared.echo.mark_not_speaking();
    tokio::select! {
        () = cancel.cancelled() => return Ok(Cycle::Stopped),
        () = tokio::time::sleep(config.settle_delay) => {}
    }

    let reference = shared.echo.take_reference();
    shared.playback.stop_all();

    let window = RecordWindow {
        ceiling: config.record_ceiling,
        speech_start_timeout: config.speech_start_timeout,
    };
    shared.status.publish(AlertStatus::Listening);
    tracing::debug!("listening for driver response");

    let since_system_audio = shared.echo.since_system_audio();
    let samples = shared.source.record(window, cancel.child_token()).await?;
    if cancel.is_cancelled() {
        return Ok(Cycle::Stopped);
    }
    if samples.is_empty() {
        tracing::debug!("no response heard");
        return Ok(Cycle::Continue);
    }

    let Some(samples) = shared.echo.screen(samples, &reference) else {
        return Ok(Cycle::Continue);
    };

    let transcript = shared
        .transcriber
        .transcribe(&samples, shared.source.sample_rate())
        .await?;
    let transcript = transcript.trim();
    if transcript.is_empty() {
        tracing::debug!("empty transcript");
        return Ok(Cycle::Continue);
    }
    if shared.echo.is_echo_at(transcript, since_system_audio) {
        return Ok(Cycle::Continue);
    }

    tracing::info!(transcript, "driver answered");

    let Some(level) = shared.enter_conversation(generation) else {
        return Ok(Cycle::Stopped);
    };
    let verdict = {
        let mut engine = shared.engine.lock().await;
        let pending = engine.request(transcript, level).await;

        // A reset while the service was thinking makes this turn stale
        if cancel.is_cancelled() || !shared.is_current(generation) {
            tracing::debug!("discarding stale verdict");
            return Ok(Cycle::Stopped);
        }
        engine.commit(pending)
    };

    shared.playback.stop_all();

    if verdict.convinced {
        shared
            .playback
            .speak(AlertChannel::Conversation, &verdict.message)
            .await;
        if shared.finish_conversation(generation) {
            shared.status.publish(AlertStatus::Awake);
        }
        tracing::info!("driver confirmed alert");
        return Ok(Cycle::Confirmed);
    }

    shared.status.publish(AlertStatus::System);
    shared
        .playback
        .speak(AlertChannel::Conversation, &verdict.message)
        .await;
    Ok(Cycle::Continue)
}
