//! REST tier store client.
//!
//! Talks PostgREST-style filter syntax to a hosted document store
//! (Supabase or compatible). One table holds the hierarchical records and
//! a second holds pending operator control signals; both share a client.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};
use crate::signal::{ControlChannel, ControlSignal};
use crate::types::{MemoryRecord, MemoryTier, NewMemoryRecord, Provenance};

use super::{TierStore, TimeRange};

const MEMORY_TABLE: &str = "hierarchical_memory";
const SIGNAL_TABLE: &str = "control_signals";

/// Connection settings for the hosted store.
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    /// Service API key, sent as both `apikey` and bearer token.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: std::time::Duration,
}

#[derive(Clone)]
struct RestClient {
    config: RestStoreConfig,
    http: reqwest::Client,
}

impl RestClient {
    fn new(config: RestStoreConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::store)?;
        Ok(Self { config, http })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url.trim_end_matches('/'), table)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::StoreStatus {
            status: status.as_u16(),
            body,
        })
    }
}

/// Row shape returned by the memory table.
#[derive(Debug, Deserialize)]
struct MemoryRow {
    id: serde_json::Value,
    tier: String,
    summary: String,
    #[serde(default)]
    metadata: Option<Provenance>,
    created_at: DateTime<Utc>,
}

impl MemoryRow {
    fn into_record(self) -> Result<MemoryRecord> {
        let tier = self
            .tier
            .parse::<MemoryTier>()
            .map_err(Error::MalformedRecord)?;

        // Ids may come back as integers or strings depending on the schema.
        let id = match self.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => return Err(Error::MalformedRecord(format!("bad id: {}", other))),
        };

        Ok(MemoryRecord {
            id,
            tier,
            summary: self.summary,
            metadata: self.metadata.unwrap_or_default(),
            created_at: self.created_at,
        })
    }
}

/// [`TierStore`] implementation over the hosted REST API.
pub struct RestStore {
    client: RestClient,
}

impl RestStore {
    pub fn new(config: RestStoreConfig) -> Result<Self> {
        Ok(Self {
            client: RestClient::new(config)?,
        })
    }
}

fn format_bound(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Build the PostgREST filter pairs for a consolidation fetch.
fn query_params(
    tier: MemoryTier,
    range: Option<TimeRange>,
    limit: Option<usize>,
    newest_first: bool,
) -> Vec<(String, String)> {
    let mut params = vec![
        ("select".to_string(), "*".to_string()),
        ("tier".to_string(), format!("eq.{}", tier)),
        (
            "order".to_string(),
            if newest_first {
                "created_at.desc".to_string()
            } else {
                "created_at.asc".to_string()
            },
        ),
    ];
    if let Some(range) = range {
        params.push(("created_at".to_string(), format!("gte.{}", format_bound(range.start))));
        params.push(("created_at".to_string(), format!("lte.{}", format_bound(range.end))));
    }
    if let Some(limit) = limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

#[async_trait]
impl TierStore for RestStore {
    async fn insert(&self, record: NewMemoryRecord) -> Result<String> {
        let url = self.client.table_url(MEMORY_TABLE);
        let response = self
            .client
            .authed(self.client.http.post(&url))
            .header("Prefer", "return=representation")
            .json(&json!({
                "tier": record.tier,
                "summary": record.summary,
                "metadata": record.metadata,
            }))
            .send()
            .await?;

        let rows: Vec<MemoryRow> = RestClient::check(response).await?.json().await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::Store("insert returned no row".to_string()))?;
        let record = row.into_record()?;

        debug!(tier = %record.tier, id = %record.id, "Inserted tier record");
        Ok(record.id)
    }

    async fn query(
        &self,
        tier: MemoryTier,
        range: Option<TimeRange>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>> {
        let url = self.client.table_url(MEMORY_TABLE);
        let response = self
            .client
            .authed(self.client.http.get(&url))
            .query(&query_params(tier, range, limit, false))
            .send()
            .await?;

        let rows: Vec<MemoryRow> = RestClient::check(response).await?.json().await?;
        rows.into_iter().map(MemoryRow::into_record).collect()
    }

    async fn delete_by_ids(&self, tier: MemoryTier, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let url = self.client.table_url(MEMORY_TABLE);
        let response = self
            .client
            .authed(self.client.http.delete(&url))
            .header("Prefer", "return=representation")
            .query(&[
                ("tier".to_string(), format!("eq.{}", tier)),
                ("id".to_string(), format!("in.({})", ids.join(","))),
            ])
            .send()
            .await?;

        let rows: Vec<serde_json::Value> = RestClient::check(response).await?.json().await?;
        Ok(rows.len())
    }

    async fn recent(&self, tier: MemoryTier, limit: usize) -> Result<Vec<MemoryRecord>> {
        let url = self.client.table_url(MEMORY_TABLE);
        let response = self
            .client
            .authed(self.client.http.get(&url))
            .query(&query_params(tier, None, Some(limit), true))
            .send()
            .await?;

        let rows: Vec<MemoryRow> = RestClient::check(response).await?.json().await?;
        rows.into_iter().map(MemoryRow::into_record).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control-signal channel
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SignalRow {
    id: serde_json::Value,
    signal_name: String,
}

/// [`ControlChannel`] over the hosted store's signal table.
///
/// Polling reads all pending rows, deletes them by id, and returns the
/// recognized signals. Unknown names are dropped with a warning so a
/// dashboard typo cannot wedge the queue.
pub struct RestControlChannel {
    client: RestClient,
}

impl RestControlChannel {
    pub fn new(config: RestStoreConfig) -> Result<Self> {
        Ok(Self {
            client: RestClient::new(config)?,
        })
    }
}

#[async_trait]
impl ControlChannel for RestControlChannel {
    async fn push(&self, signal: ControlSignal) -> Result<()> {
        let url = self.client.table_url(SIGNAL_TABLE);
        let response = self
            .client
            .authed(self.client.http.post(&url))
            .json(&json!({ "signal_name": signal.as_str() }))
            .send()
            .await?;

        RestClient::check(response).await?;
        Ok(())
    }

    async fn poll_and_clear(&self) -> Result<Vec<ControlSignal>> {
        let url = self.client.table_url(SIGNAL_TABLE);
        let response = self
            .client
            .authed(self.client.http.get(&url))
            .query(&[("select", "*"), ("order", "id.asc")])
            .send()
            .await?;

        let rows: Vec<SignalRow> = RestClient::check(response).await?.json().await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows
            .iter()
            .map(|row| match &row.id {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();

        let response = self
            .client
            .authed(self.client.http.delete(&url))
            .query(&[("id".to_string(), format!("in.({})", ids.join(",")))])
            .send()
            .await?;
        RestClient::check(response).await?;

        let mut signals = Vec::new();
        for row in rows {
            match row.signal_name.parse::<ControlSignal>() {
                Ok(signal) => signals.push(signal),
                Err(_) => {
                    tracing::warn!(name = %row.signal_name, "Dropping unknown control signal");
                }
            }
        }
        Ok(signals)
    }
}
