//! In-memory tier store.
//!
//! Backs tests and local runs with the same contract the REST store
//! provides, including store-assigned ids and creation timestamps.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{MemoryRecord, MemoryTier, NewMemoryRecord};

use super::{TierStore, TimeRange};

/// In-memory [`TierStore`] implementation.
#[derive(Default)]
pub struct MemStore {
    // BTreeMap keyed by (created_at, id) keeps range scans oldest-first.
    records: Mutex<BTreeMap<(DateTime<Utc>, String), MemoryRecord>>,
    clock: Mutex<Option<DateTime<Utc>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the timestamp assigned to subsequent inserts. Tests use this to
    /// build records with known creation times.
    pub fn set_clock(&self, now: DateTime<Utc>) {
        if let Ok(mut pinned) = self.clock.lock() {
            *pinned = Some(now);
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock
            .lock()
            .ok()
            .and_then(|pinned| *pinned)
            .unwrap_or_else(Utc::now)
    }

    /// Count of records in one tier.
    pub fn count(&self, tier: MemoryTier) -> usize {
        self.records
            .lock()
            .map(|records| records.values().filter(|r| r.tier == tier).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl TierStore for MemStore {
    async fn insert(&self, record: NewMemoryRecord) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let created_at = self.now();

        let stored = MemoryRecord {
            id: id.clone(),
            tier: record.tier,
            summary: record.summary,
            metadata: record.metadata,
            created_at,
        };

        self.records
            .lock()
            .map_err(|_| Error::LockPoisoned)?
            .insert((created_at, id.clone()), stored);
        Ok(id)
    }

    async fn query(
        &self,
        tier: MemoryTier,
        range: Option<TimeRange>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>> {
        let records = self.records.lock().map_err(|_| Error::LockPoisoned)?;

        let matches = records
            .values()
            .filter(|r| r.tier == tier)
            .filter(|r| match range {
                Some(range) => r.created_at >= range.start && r.created_at <= range.end,
                None => true,
            })
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(matches)
    }

    async fn delete_by_ids(&self, tier: MemoryTier, ids: &[String]) -> Result<usize> {
        let mut records = self.records.lock().map_err(|_| Error::LockPoisoned)?;

        let keys: Vec<(DateTime<Utc>, String)> = records
            .iter()
            .filter(|(_, r)| r.tier == tier && ids.contains(&r.id))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &keys {
            records.remove(key);
        }
        Ok(keys.len())
    }

    async fn recent(&self, tier: MemoryTier, limit: usize) -> Result<Vec<MemoryRecord>> {
        let records = self.records.lock().map_err(|_| Error::LockPoisoned)?;

        Ok(records
            .values()
            .rev()
            .filter(|r| r.tier == tier)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provenance;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(tier: MemoryTier, summary: &str) -> NewMemoryRecord {
        NewMemoryRecord {
            tier,
            summary: summary.to_string(),
            metadata: Provenance::default(),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_timestamp() {
        let store = MemStore::new();
        store.set_clock(at(0));

        let id = store
            .insert(record(MemoryTier::Daily, "a day"))
            .await
            .unwrap();

        let records = store.query(MemoryTier::Daily, None, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].created_at, at(0));
    }

    #[tokio::test]
    async fn test_query_is_oldest_first_and_range_bounded() {
        let store = MemStore::new();
        for i in 0..3 {
            store.set_clock(at(i * 60));
            store
                .insert(record(MemoryTier::Transfer, &format!("chunk {}", i)))
                .await
                .unwrap();
        }

        let all = store.query(MemoryTier::Transfer, None, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].summary, "chunk 0");
        assert_eq!(all[2].summary, "chunk 2");

        let bounded = store
            .query(
                MemoryTier::Transfer,
                Some(TimeRange {
                    start: at(30),
                    end: at(90),
                }),
                None,
            )
            .await
            .unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].summary, "chunk 1");
    }

    #[tokio::test]
    async fn test_delete_by_ids_is_tier_scoped() {
        let store = MemStore::new();
        store.set_clock(at(0));
        let daily_id = store
            .insert(record(MemoryTier::Daily, "daily"))
            .await
            .unwrap();
        store.set_clock(at(1));
        let weekly_id = store
            .insert(record(MemoryTier::Weekly, "weekly"))
            .await
            .unwrap();

        // Wrong tier deletes nothing.
        let deleted = store
            .delete_by_ids(MemoryTier::Daily, &[weekly_id.clone()])
            .await
            .unwrap();
        assert_eq!(deleted, 0);

        let deleted = store
            .delete_by_ids(MemoryTier::Daily, &[daily_id])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count(MemoryTier::Daily), 0);
        assert_eq!(store.count(MemoryTier::Weekly), 1);
        let _ = weekly_id;
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let store = MemStore::new();
        for i in 0..3 {
            store.set_clock(at(i * 60));
            store
                .insert(record(MemoryTier::Weekly, &format!("week {}", i)))
                .await
                .unwrap();
        }

        let recent = store.recent(MemoryTier::Weekly, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].summary, "week 2");
        assert_eq!(recent[1].summary, "week 1");
    }
}
