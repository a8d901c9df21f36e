//! Chat event ingestion route.
//!
//! The IRC client is an external collaborator; it delivers already-framed
//! chat lines here. Events only live in the buffer until the next drain.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use chronicle_core::ChatEvent;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::AppState;

/// Create events router
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/events", post(ingest_event))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestEventRequest {
    pub user: String,
    pub content: String,
    /// Defaults to arrival time when the client does not stamp the line.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestEventResponse {
    pub buffered: usize,
}

async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestEventRequest>,
) -> Result<Json<IngestEventResponse>, (StatusCode, String)> {
    let event = ChatEvent::new(
        request.user,
        request.content,
        request.timestamp.unwrap_or_else(Utc::now),
    );

    let buffered = state.buffer.append(event).map_err(|e| match e {
        chronicle_core::Error::EmptyEvent => {
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })?;

    debug!(buffered, "Chat event buffered");
    Ok(Json(IngestEventResponse { buffered }))
}
