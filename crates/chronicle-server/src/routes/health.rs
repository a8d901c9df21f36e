//! Health check endpoint.

use std::sync::Arc;

use axum::{extract::State, Json};
use chronicle_core::MemoryTier;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: HealthComponents,
    pub metrics: HealthMetrics,
}

#[derive(Serialize)]
pub struct HealthComponents {
    pub tier_store: bool,
}

#[derive(Serialize)]
pub struct HealthMetrics {
    pub buffered_events: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    // A minimal read doubles as the store reachability probe.
    let store_healthy = state.store.recent(MemoryTier::Transfer, 1).await.is_ok();
    let buffered_events = state.buffer.len().unwrap_or(0);

    let status = if store_healthy { "healthy" } else { "degraded" };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: HealthComponents {
            tier_store: store_healthy,
        },
        metrics: HealthMetrics { buffered_events },
    })
}
