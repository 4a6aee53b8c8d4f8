//! Status endpoints: snapshot and live server-sent events

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::Stream;
use serde::Serialize;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::WatchStream;

use super::ApiState;
use crate::alert::{DrowsinessLevel, SystemAlertState};
use crate::status::AlertStatus;

/// Build status router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(snapshot))
        .route("/live", get(live))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: AlertStatus,
    pub level: DrowsinessLevel,
    pub state: SystemAlertState,
    pub listening: bool,
}

async fn snapshot(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let alerts = &state.alerts;
    Json(StatusResponse {
        status: alerts.status().current(),
        level: alerts.level(),
        state: alerts.state(),
        listening: alerts.is_listening(),
    })
}

/// One event with the current status, then one per change
async fn live(
    State(state): State<Arc<ApiState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.alerts.status().subscribe())
        .map(|status| Ok(Event::default().data(status.as_str())));

    Sse::new(stream).keep_alive(KeepAlive::default())
}
