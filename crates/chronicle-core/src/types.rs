//! Shared types for chronicle-core.
//!
//! These types are used by the consolidation pipeline, the tier store
//! client, and the server's HTTP surface.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Memory Tiers
// ─────────────────────────────────────────────────────────────────────────────

/// One rung of the memory hierarchy, each coarser and lower-volume than
/// the last.
///
/// Chat events are folded into `Transfer` records, which consolidate up the
/// ladder one tier at a time. `Secular` is the top: it is never consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    Transfer,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Secular,
}

impl MemoryTier {
    /// All tiers, lowest first.
    pub const ALL: [MemoryTier; 6] = [
        MemoryTier::Transfer,
        MemoryTier::Daily,
        MemoryTier::Weekly,
        MemoryTier::Monthly,
        MemoryTier::Yearly,
        MemoryTier::Secular,
    ];

    /// The tier a consolidation out of this tier writes into.
    pub fn next(&self) -> Option<MemoryTier> {
        match self {
            MemoryTier::Transfer => Some(MemoryTier::Daily),
            MemoryTier::Daily => Some(MemoryTier::Weekly),
            MemoryTier::Weekly => Some(MemoryTier::Monthly),
            MemoryTier::Monthly => Some(MemoryTier::Yearly),
            MemoryTier::Yearly => Some(MemoryTier::Secular),
            MemoryTier::Secular => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::Transfer => "transfer",
            MemoryTier::Daily => "daily",
            MemoryTier::Weekly => "weekly",
            MemoryTier::Monthly => "monthly",
            MemoryTier::Yearly => "yearly",
            MemoryTier::Secular => "secular",
        }
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(MemoryTier::Transfer),
            "daily" => Ok(MemoryTier::Daily),
            "weekly" => Ok(MemoryTier::Weekly),
            "monthly" => Ok(MemoryTier::Monthly),
            "yearly" => Ok(MemoryTier::Yearly),
            "secular" => Ok(MemoryTier::Secular),
            _ => Err(format!("unknown memory tier: {}", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// Provenance metadata carried by a tier record.
///
/// Each tier populates exactly the fields the next-higher tier's
/// consolidation reads; everything else stays `None` and is omitted from
/// the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Calendar date covered (transfer and daily records).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// First date covered (weekly and secular-adjacent ranges).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Last date covered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Month label in `YYYY-MM` form (monthly records).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    /// Year covered (yearly records).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// First year covered (secular records).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_year: Option<i32>,
    /// Last year covered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_year: Option<i32>,
}

impl Provenance {
    /// Human-readable label for transcript grounding and context rendering.
    pub fn label(&self) -> Option<String> {
        if let (Some(start), Some(end)) = (self.start_year, self.end_year) {
            return Some(format!("{}..{}", start, end));
        }
        if let Some(year) = self.year {
            return Some(year.to_string());
        }
        if let Some(month) = &self.month {
            return Some(month.clone());
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            return Some(format!("{} to {}", start, end));
        }
        self.date.map(|d| d.to_string())
    }
}

/// The unit flowing through every tier.
///
/// `id` and `created_at` are assigned by the tier store on insert. Records
/// are never edited by the pipeline: they are written once by a
/// consolidation and deleted once their content has been folded upward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub tier: MemoryTier,
    pub summary: String,
    #[serde(default)]
    pub metadata: Provenance,
    pub created_at: DateTime<Utc>,
}

/// Input for inserting a new tier record.
#[derive(Debug, Clone, Serialize)]
pub struct NewMemoryRecord {
    pub tier: MemoryTier,
    pub summary: String,
    pub metadata: Provenance,
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Events
// ─────────────────────────────────────────────────────────────────────────────

/// A single inbound chat line.
///
/// Held only in process memory between drains; it exists to be folded into
/// a transfer-tier record and then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    pub user: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatEvent {
    pub fn new(user: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            user: user.into(),
            content: content.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ladder_order() {
        let mut tier = MemoryTier::Transfer;
        let mut hops = 0;
        while let Some(next) = tier.next() {
            assert!(next > tier);
            tier = next;
            hops += 1;
        }
        assert_eq!(tier, MemoryTier::Secular);
        assert_eq!(hops, MemoryTier::ALL.len() - 1);
    }

    #[test]
    fn test_tier_string_roundtrip() {
        for tier in MemoryTier::ALL {
            assert_eq!(tier.as_str().parse::<MemoryTier>(), Ok(tier));
        }
        assert!("hourly".parse::<MemoryTier>().is_err());
    }

    #[test]
    fn test_provenance_serializes_sparse() {
        let metadata = Provenance {
            date: Some(NaiveDate::from_ymd_opt(2025, 1, 3).unwrap()),
            ..Default::default()
        };

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json, serde_json::json!({"date": "2025-01-03"}));
    }

    #[test]
    fn test_provenance_label_precedence() {
        let weekly = Provenance {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 7),
            ..Default::default()
        };
        assert_eq!(weekly.label().unwrap(), "2025-01-01 to 2025-01-07");

        let secular = Provenance {
            start_year: Some(1925),
            end_year: Some(2025),
            ..Default::default()
        };
        assert_eq!(secular.label().unwrap(), "1925..2025");

        assert_eq!(Provenance::default().label(), None);
    }
}
