//! Responder context boundary.
//!
//! The conversational responder consumes the top few records of selected
//! tiers as background for its prompt. This module is the whole of the
//! pipeline's obligation to it: well-formed records, newest first, with a
//! plain-text rendering.

use tracing::error;

use crate::error::Result;
use crate::store::TierStore;
use crate::types::{MemoryRecord, MemoryTier};

/// The recent records of one tier.
#[derive(Debug, Clone)]
pub struct ContextSlice {
    pub tier: MemoryTier,
    pub records: Vec<MemoryRecord>,
}

/// Fetch the top-`per_tier` most recent records of each selected tier.
///
/// A tier whose fetch fails contributes an empty slice rather than failing
/// the whole gather; the responder degrades to less context.
pub async fn gather_context(
    store: &dyn TierStore,
    tiers: &[MemoryTier],
    per_tier: usize,
) -> Result<Vec<ContextSlice>> {
    let mut slices = Vec::with_capacity(tiers.len());

    for &tier in tiers {
        let records = match store.recent(tier, per_tier).await {
            Ok(records) => records,
            Err(e) => {
                error!(tier = %tier, error = %e, "Context fetch failed; returning empty slice");
                Vec::new()
            }
        };
        slices.push(ContextSlice { tier, records });
    }

    Ok(slices)
}

/// Render gathered context as prompt-ready text.
pub fn format_context(slices: &[ContextSlice]) -> String {
    let mut sections = Vec::new();

    for slice in slices {
        if slice.records.is_empty() {
            continue;
        }

        let mut lines = vec![format!("## {} memory", slice.tier)];
        for record in &slice.records {
            match record.metadata.label() {
                Some(label) => lines.push(format!("- [{}] {}", label, record.summary)),
                None => lines.push(format!("- {}", record.summary)),
            }
        }
        sections.push(lines.join("\n"));
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use crate::types::{NewMemoryRecord, Provenance};
    use chrono::{DateTime, NaiveDate, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_gather_is_newest_first_per_tier() {
        let store = MemStore::new();
        for i in 0..4 {
            store.set_clock(at(i * 60));
            store
                .insert(NewMemoryRecord {
                    tier: MemoryTier::Daily,
                    summary: format!("day {}", i),
                    metadata: Provenance::default(),
                })
                .await
                .unwrap();
        }

        let slices = gather_context(&store, &[MemoryTier::Daily, MemoryTier::Weekly], 2)
            .await
            .unwrap();

        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].records.len(), 2);
        assert_eq!(slices[0].records[0].summary, "day 3");
        assert!(slices[1].records.is_empty());
    }

    #[tokio::test]
    async fn test_format_context_labels_and_skips_empty() {
        let store = MemStore::new();
        store.set_clock(at(0));
        store
            .insert(NewMemoryRecord {
                tier: MemoryTier::Weekly,
                summary: "a lively week".to_string(),
                metadata: Provenance {
                    start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
                    end_date: NaiveDate::from_ymd_opt(2025, 1, 7),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let slices = gather_context(&store, &[MemoryTier::Weekly, MemoryTier::Secular], 5)
            .await
            .unwrap();
        let text = format_context(&slices);

        assert!(text.contains("## weekly memory"));
        assert!(text.contains("[2025-01-01 to 2025-01-07] a lively week"));
        assert!(!text.contains("secular"));
    }
}
