//! Tier store boundary.
//!
//! The tier store is an external keyed document store reached over the
//! network. The pipeline only needs insert, range-query, and
//! delete-by-id-set; anything richer (search, mutation, pagination UIs)
//! belongs to the dashboard, which reads the store directly.

mod memory;
mod rest;

pub use memory::MemStore;
pub use rest::{RestControlChannel, RestStore, RestStoreConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{MemoryRecord, MemoryTier, NewMemoryRecord};

/// Inclusive creation-time bounds for a consolidation fetch.
#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Keyed store of memory records, queryable by tier and creation time.
#[async_trait]
pub trait TierStore: Send + Sync {
    /// Insert one record; the store assigns `id` and `created_at`.
    async fn insert(&self, record: NewMemoryRecord) -> Result<String>;

    /// All records of a tier, oldest first, optionally bounded by creation
    /// time and capped at `limit`.
    async fn query(
        &self,
        tier: MemoryTier,
        range: Option<TimeRange>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>>;

    /// Delete records by id. Returns how many were deleted.
    async fn delete_by_ids(&self, tier: MemoryTier, ids: &[String]) -> Result<usize>;

    /// Most recent records of a tier, newest first (responder context).
    async fn recent(&self, tier: MemoryTier, limit: usize) -> Result<Vec<MemoryRecord>>;
}
