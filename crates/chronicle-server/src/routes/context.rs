//! Responder context route.
//!
//! The conversational responder fetches the most recent records of the
//! tiers it wants as prompt background.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chronicle_core::context::{format_context, gather_context};
use chronicle_core::{MemoryRecord, MemoryTier};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

const DEFAULT_LIMIT: usize = 3;

/// Tiers the responder reads when it does not ask for specific ones.
const DEFAULT_TIERS: [MemoryTier; 3] = [MemoryTier::Daily, MemoryTier::Weekly, MemoryTier::Monthly];

/// Create context router
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/context", get(get_context))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextQuery {
    /// Comma-separated tier names; defaults to daily,weekly,monthly.
    pub tiers: Option<String>,
    /// Records per tier; defaults to 3.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSliceResponse {
    pub tier: MemoryTier,
    pub records: Vec<MemoryRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResponse {
    pub slices: Vec<ContextSliceResponse>,
    /// Prompt-ready rendering of the same records.
    pub text: String,
}

async fn get_context(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> Result<Json<ContextResponse>, (StatusCode, String)> {
    let tiers = match &query.tiers {
        Some(raw) => parse_tiers(raw).map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e))?,
        None => DEFAULT_TIERS.to_vec(),
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

    let slices = gather_context(state.store.as_ref(), &tiers, limit)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    let text = format_context(&slices);
    Ok(Json(ContextResponse {
        slices: slices
            .into_iter()
            .map(|slice| ContextSliceResponse {
                tier: slice.tier,
                records: slice.records,
            })
            .collect(),
        text,
    }))
}

fn parse_tiers(raw: &str) -> Result<Vec<MemoryTier>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<MemoryTier>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tiers() {
        assert_eq!(
            parse_tiers("daily, weekly").unwrap(),
            vec![MemoryTier::Daily, MemoryTier::Weekly]
        );
        assert!(parse_tiers("daily,hourly").is_err());
        assert!(parse_tiers("").unwrap().is_empty());
    }
}
