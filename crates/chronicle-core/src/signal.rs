//! Operator control signals.
//!
//! An operator can ask for any consolidation tier to run immediately,
//! bypassing its batch-size gate. Signals travel through an external
//! channel the scheduler polls; consumption clears them, and duplicate
//! delivery is harmless because a forced run on an empty source tier is a
//! no-op.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::MemoryTier;

/// The closed set of operator instructions, one per forceable tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    ForceDailySummary,
    ForceWeeklySummary,
    ForceMonthlySummary,
    ForceYearlySummary,
    ForceSecularSummary,
}

impl ControlSignal {
    pub const ALL: [ControlSignal; 5] = [
        ControlSignal::ForceDailySummary,
        ControlSignal::ForceWeeklySummary,
        ControlSignal::ForceMonthlySummary,
        ControlSignal::ForceYearlySummary,
        ControlSignal::ForceSecularSummary,
    ];

    /// Destination tier of the consolidation this signal forces.
    pub fn tier(&self) -> MemoryTier {
        match self {
            ControlSignal::ForceDailySummary => MemoryTier::Daily,
            ControlSignal::ForceWeeklySummary => MemoryTier::Weekly,
            ControlSignal::ForceMonthlySummary => MemoryTier::Monthly,
            ControlSignal::ForceYearlySummary => MemoryTier::Yearly,
            ControlSignal::ForceSecularSummary => MemoryTier::Secular,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlSignal::ForceDailySummary => "FORCE_DAILY_SUMMARY",
            ControlSignal::ForceWeeklySummary => "FORCE_WEEKLY_SUMMARY",
            ControlSignal::ForceMonthlySummary => "FORCE_MONTHLY_SUMMARY",
            ControlSignal::ForceYearlySummary => "FORCE_YEARLY_SUMMARY",
            ControlSignal::ForceSecularSummary => "FORCE_SECULAR_SUMMARY",
        }
    }
}

impl std::fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ControlSignal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FORCE_DAILY_SUMMARY" => Ok(ControlSignal::ForceDailySummary),
            "FORCE_WEEKLY_SUMMARY" => Ok(ControlSignal::ForceWeeklySummary),
            "FORCE_MONTHLY_SUMMARY" => Ok(ControlSignal::ForceMonthlySummary),
            "FORCE_YEARLY_SUMMARY" => Ok(ControlSignal::ForceYearlySummary),
            "FORCE_SECULAR_SUMMARY" => Ok(ControlSignal::ForceSecularSummary),
            _ => Err(Error::UnknownSignal(s.to_string())),
        }
    }
}

/// Out-of-band channel carrying operator instructions to the scheduler.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Enqueue a signal (operator side).
    async fn push(&self, signal: ControlSignal) -> Result<()>;

    /// Take all pending signals, clearing them from the channel.
    async fn poll_and_clear(&self) -> Result<Vec<ControlSignal>>;
}

/// In-process [`ControlChannel`] used by tests and single-binary setups.
#[derive(Default)]
pub struct MemChannel {
    pending: Mutex<Vec<ControlSignal>>,
}

impl MemChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ControlChannel for MemChannel {
    async fn push(&self, signal: ControlSignal) -> Result<()> {
        self.pending
            .lock()
            .map_err(|_| Error::LockPoisoned)?
            .push(signal);
        Ok(())
    }

    async fn poll_and_clear(&self) -> Result<Vec<ControlSignal>> {
        let mut pending = self.pending.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(std::mem::take(&mut *pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_name_roundtrip() {
        for signal in ControlSignal::ALL {
            assert_eq!(signal.as_str().parse::<ControlSignal>().unwrap(), signal);
        }
        assert!("FORCE_TRANSFER_SUMMARY".parse::<ControlSignal>().is_err());
    }

    #[test]
    fn test_signal_targets_forceable_tiers() {
        let tiers: Vec<MemoryTier> = ControlSignal::ALL.iter().map(|s| s.tier()).collect();
        assert!(!tiers.contains(&MemoryTier::Transfer));
        assert_eq!(tiers.len(), 5);
    }

    #[tokio::test]
    async fn test_mem_channel_clears_on_poll() {
        let channel = MemChannel::new();
        channel.push(ControlSignal::ForceDailySummary).await.unwrap();
        channel.push(ControlSignal::ForceWeeklySummary).await.unwrap();

        let signals = channel.poll_and_clear().await.unwrap();
        assert_eq!(
            signals,
            vec![
                ControlSignal::ForceDailySummary,
                ControlSignal::ForceWeeklySummary
            ]
        );
        assert!(channel.poll_and_clear().await.unwrap().is_empty());
    }
}
