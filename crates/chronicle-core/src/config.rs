//! Configuration for the memory pipeline.

use chrono::{FixedOffset, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the memory pipeline.
///
/// Defaults match the channel the system was tuned on; every knob is
/// overridable from the server config file or environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Buffer drains when it holds this many events.
    #[serde(default = "default_buffer_max_events")]
    pub buffer_max_events: usize,

    /// Buffer drains when its oldest event is this old (seconds).
    #[serde(default = "default_buffer_max_age_secs")]
    pub buffer_max_age_secs: u64,

    /// A time-triggered drain below this count is discarded without
    /// paying for a summarization call.
    #[serde(default = "default_buffer_min_events")]
    pub buffer_min_events: usize,

    /// Daily records required to form one weekly record.
    #[serde(default = "default_weekly_batch")]
    pub weekly_batch: usize,

    /// Weekly records required to form one monthly record.
    #[serde(default = "default_monthly_batch")]
    pub monthly_batch: usize,

    /// Monthly records required to form one yearly record.
    #[serde(default = "default_yearly_batch")]
    pub yearly_batch: usize,

    /// Yearly records required to form one secular record.
    #[serde(default = "default_secular_batch")]
    pub secular_batch: usize,

    /// Hard cap on records fetched per consolidation run.
    #[serde(default = "default_fetch_cap")]
    pub fetch_cap: usize,

    /// UTC offset of the channel's broadcast timezone, in hours.
    /// Schedules and the "yesterday" window are evaluated in this offset.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Summarization engine request timeout (seconds). Expiry is treated
    /// the same as an empty summary: abort and retry next cycle.
    #[serde(default = "default_engine_timeout_secs")]
    pub engine_timeout_secs: u64,

    /// How often the scheduler polls the control-signal channel (seconds).
    #[serde(default = "default_signal_poll_secs")]
    pub signal_poll_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            buffer_max_events: default_buffer_max_events(),
            buffer_max_age_secs: default_buffer_max_age_secs(),
            buffer_min_events: default_buffer_min_events(),
            weekly_batch: default_weekly_batch(),
            monthly_batch: default_monthly_batch(),
            yearly_batch: default_yearly_batch(),
            secular_batch: default_secular_batch(),
            fetch_cap: default_fetch_cap(),
            utc_offset_hours: default_utc_offset_hours(),
            engine_timeout_secs: default_engine_timeout_secs(),
            signal_poll_secs: default_signal_poll_secs(),
        }
    }
}

impl MemoryConfig {
    /// The configured broadcast timezone as a chrono offset.
    pub fn local_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .ok_or_else(|| Error::Config(format!("invalid UTC offset: {}h", self.utc_offset_hours)))
    }
}

/// Wall-clock schedule for the consolidation jobs, evaluated in the
/// configured broadcast timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Daily consolidation fire time (hour, minute).
    #[serde(default = "default_daily_at")]
    pub daily_at: (u32, u32),

    /// Weekly consolidation fire time (weekday, hour, minute).
    #[serde(default = "default_weekly_at")]
    pub weekly_at: (Weekday, u32, u32),

    /// Monthly consolidation fire time (day of month, hour, minute).
    #[serde(default = "default_monthly_at")]
    pub monthly_at: (u32, u32, u32),

    /// Yearly consolidation fire time (month, day, hour, minute).
    #[serde(default = "default_yearly_at")]
    pub yearly_at: (u32, u32, u32, u32),

    /// Secular consolidation check time (month, day, hour, minute).
    /// The 100-year batch gate inside the run keeps this a no-op until
    /// enough yearly records exist.
    #[serde(default = "default_secular_at")]
    pub secular_at: (u32, u32, u32, u32),
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_at: default_daily_at(),
            weekly_at: default_weekly_at(),
            monthly_at: default_monthly_at(),
            yearly_at: default_yearly_at(),
            secular_at: default_secular_at(),
        }
    }
}

fn default_buffer_max_events() -> usize {
    40
}

fn default_buffer_max_age_secs() -> u64 {
    15 * 60
}

fn default_buffer_min_events() -> usize {
    5
}

fn default_weekly_batch() -> usize {
    7
}

fn default_monthly_batch() -> usize {
    4
}

fn default_yearly_batch() -> usize {
    12
}

fn default_secular_batch() -> usize {
    100
}

fn default_fetch_cap() -> usize {
    500
}

fn default_utc_offset_hours() -> i32 {
    -3
}

fn default_engine_timeout_secs() -> u64 {
    30
}

fn default_signal_poll_secs() -> u64 {
    60
}

fn default_daily_at() -> (u32, u32) {
    (0, 15)
}

fn default_weekly_at() -> (Weekday, u32, u32) {
    (Weekday::Mon, 1, 0)
}

fn default_monthly_at() -> (u32, u32, u32) {
    (1, 1, 30)
}

fn default_yearly_at() -> (u32, u32, u32, u32) {
    (1, 1, 2, 0)
}

fn default_secular_at() -> (u32, u32, u32, u32) {
    (1, 1, 3, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_channel_tuning() {
        let config = MemoryConfig::default();

        assert_eq!(config.buffer_max_events, 40);
        assert_eq!(config.buffer_max_age_secs, 900);
        assert_eq!(config.buffer_min_events, 5);
        assert_eq!(config.weekly_batch, 7);
        assert_eq!(config.monthly_batch, 4);
        assert_eq!(config.yearly_batch, 12);
        assert_eq!(config.secular_batch, 100);
    }

    #[test]
    fn test_local_offset() {
        let config = MemoryConfig {
            utc_offset_hours: -3,
            ..Default::default()
        };
        assert_eq!(config.local_offset().unwrap().local_minus_utc(), -3 * 3600);

        let bad = MemoryConfig {
            utc_offset_hours: 99,
            ..Default::default()
        };
        assert!(bad.local_offset().is_err());
    }

    #[test]
    fn test_partial_toml_uses_field_defaults() {
        let config: MemoryConfig = toml::from_str("weekly_batch = 5").unwrap();
        assert_eq!(config.weekly_batch, 5);
        assert_eq!(config.buffer_max_events, 40);
    }
}
