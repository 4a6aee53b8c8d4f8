//! Drowsiness feed endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::alert::DrowsinessLevel;
use crate::status::AlertStatus;

/// Build drowsiness router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/level", post(set_level))
        .route("/no-face", post(no_face))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct LevelRequest {
    pub level: String,
}

#[derive(Debug, Serialize)]
pub struct LevelResponse {
    pub level: DrowsinessLevel,
    pub status: AlertStatus,
}

/// Push a new drowsiness level
async fn set_level(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<LevelRequest>,
) -> Result<Json<LevelResponse>, DrowsinessError> {
    let level: DrowsinessLevel = request
        .level
        .parse()
        .map_err(|_| DrowsinessError::BadRequest(format!("unknown level: {}", request.level)))?;

    state.alerts.update(level);

    Ok(Json(LevelResponse {
        level,
        status: state.alerts.status().current(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct NoFaceRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NoFaceResponse {
    pub played: bool,
}

/// Speak the no-face warning; the body is optional
async fn no_face(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<NoFaceResponse>, DrowsinessError> {
    let request: NoFaceRequest = if body.iter().all(u8::is_ascii_whitespace) {
        NoFaceRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| DrowsinessError::BadRequest(format!("invalid body: {e}")))?
    };

    let played = state.alerts.no_face_alert(request.message.as_deref()).await;
    Ok(Json(NoFaceResponse { played }))
}

/// Drowsiness API errors
#[derive(Debug)]
pub enum DrowsinessError {
    BadRequest(String),
}

impl IntoResponse for DrowsinessError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
        };

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}
