//! Operator control-signal route.
//!
//! Accepts a force-consolidation instruction and enqueues it on the
//! control channel; the scheduler picks it up on its next poll.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chronicle_core::ControlSignal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::AppState;

/// Create signals router
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/signals", post(enqueue_signal))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueSignalRequest {
    /// One of the FORCE_*_SUMMARY names.
    pub signal: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueSignalResponse {
    pub queued: String,
}

async fn enqueue_signal(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnqueueSignalRequest>,
) -> Result<(StatusCode, Json<EnqueueSignalResponse>), (StatusCode, String)> {
    let signal: ControlSignal = request
        .signal
        .parse()
        .map_err(|e: chronicle_core::Error| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    state
        .signals
        .push(signal)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    info!(signal = %signal, "Operator signal queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueSignalResponse {
            queued: signal.to_string(),
        }),
    ))
}
