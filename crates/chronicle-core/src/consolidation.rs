//! Tier consolidation pipeline.
//!
//! One function shape, instantiated per tier pair: fetch N source records,
//! summarize them into one destination record, then delete the sources.
//! Commit-then-reap is the only consistency discipline — failure at any
//! step biases toward re-summarizing later, never toward losing source
//! data. The transfer stage folds the in-memory chat buffer instead of a
//! source tier but follows the same shape.

use std::sync::Arc;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc,
};
use tracing::{debug, error, info, warn};

use crate::buffer::ChatBuffer;
use crate::config::MemoryConfig;
use crate::engine::{SummaryRequest, Summarizer};
use crate::error::Result;
use crate::store::{TierStore, TimeRange};
use crate::types::{ChatEvent, MemoryRecord, MemoryTier, NewMemoryRecord, Provenance};

// ─────────────────────────────────────────────────────────────────────────────
// Transitions
// ─────────────────────────────────────────────────────────────────────────────

/// Which slice of the source tier a consolidation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceWindow {
    /// Yesterday in the configured broadcast timezone (ignored when forced).
    Yesterday,
    /// Everything currently in the source tier.
    All,
}

/// One rung of the consolidation ladder.
#[derive(Debug, Clone)]
pub struct TransitionSpec {
    pub source: MemoryTier,
    pub dest: MemoryTier,
    /// Minimum fetched records for a non-forced run to proceed.
    pub min_batch: usize,
    pub window: SourceWindow,
}

impl TransitionSpec {
    /// The transition that writes into `dest`, or `None` for the bottom
    /// tier (which is fed by the chat buffer, not a store tier).
    pub fn into_tier(dest: MemoryTier, config: &MemoryConfig) -> Option<Self> {
        let (source, min_batch, window) = match dest {
            MemoryTier::Transfer => return None,
            MemoryTier::Daily => (MemoryTier::Transfer, 1, SourceWindow::Yesterday),
            MemoryTier::Weekly => (MemoryTier::Daily, config.weekly_batch, SourceWindow::All),
            MemoryTier::Monthly => (MemoryTier::Weekly, config.monthly_batch, SourceWindow::All),
            MemoryTier::Yearly => (MemoryTier::Monthly, config.yearly_batch, SourceWindow::All),
            MemoryTier::Secular => (MemoryTier::Yearly, config.secular_batch, SourceWindow::All),
        };

        Some(Self {
            source,
            dest,
            min_batch,
            window,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal state of one consolidation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    /// Not enough source records; nothing was read, written, or deleted.
    /// A frequently-hit, non-error outcome.
    AbortedLowCount { found: usize, required: usize },
    /// The engine produced no usable summary; sources are preserved for
    /// the next scheduled or forced attempt.
    AbortedEmptySummary,
    /// One destination record was written and the sources reaped.
    /// `reap_failed` marks the at-least-once duplication risk: the
    /// sources survived the delete and will be re-consolidated.
    Committed {
        record_id: String,
        consumed: usize,
        reap_failed: bool,
    },
}

/// What fired a buffer drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainTrigger {
    /// The buffer reached its size threshold.
    Size,
    /// The window reached its age threshold.
    Age,
}

/// Terminal state of one buffer drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferDrainOutcome {
    /// Nothing buffered.
    Empty,
    /// Below the minimum event count on a time trigger; the window was
    /// cleared without paying for a summarization call.
    Discarded { events: usize },
    /// The engine failed; the events went back into the buffer for the
    /// next cycle.
    Deferred { events: usize },
    /// One transfer record was written and the buffer cleared.
    Summarized { record_id: String, events: usize },
}

// ─────────────────────────────────────────────────────────────────────────────
// Consolidator
// ─────────────────────────────────────────────────────────────────────────────

/// Runs tier consolidations against the tier store and the summarization
/// engine. Construct once at startup and hand to the scheduler.
pub struct Consolidator {
    store: Arc<dyn TierStore>,
    engine: Arc<dyn Summarizer>,
    config: MemoryConfig,
    offset: FixedOffset,
}

impl Consolidator {
    pub fn new(
        store: Arc<dyn TierStore>,
        engine: Arc<dyn Summarizer>,
        config: MemoryConfig,
    ) -> Result<Self> {
        let offset = config.local_offset()?;
        Ok(Self {
            store,
            engine,
            config,
            offset,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Run one consolidation now.
    pub async fn run(&self, spec: &TransitionSpec, force: bool) -> Result<ConsolidationOutcome> {
        self.run_at(spec, force, Utc::now()).await
    }

    /// Run one consolidation as of `now` (injectable for tests).
    pub async fn run_at(
        &self,
        spec: &TransitionSpec,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<ConsolidationOutcome> {
        let range = match (spec.window, force) {
            (SourceWindow::Yesterday, false) => Some(self.yesterday_range(now)),
            _ => None,
        };

        // A read failure masks real data, so it is logged loudly, but the
        // run itself degrades to an empty fetch and aborts quietly below.
        let mut records = match self
            .store
            .query(spec.source, range, Some(self.config.fetch_cap + 1))
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!(source = %spec.source, error = %e, "Tier store read failed; treating as empty fetch");
                Vec::new()
            }
        };

        if records.len() > self.config.fetch_cap {
            records.truncate(self.config.fetch_cap);
            info!(
                source = %spec.source,
                cap = self.config.fetch_cap,
                "Fetch cap reached; remaining records queue for the next run"
            );
        }

        // Records missing the provenance this transition reads are left
        // in place untouched: neither summarized nor deleted.
        let records: Vec<MemoryRecord> = records
            .into_iter()
            .filter(|record| {
                let usable = has_required_provenance(spec.dest, record);
                if !usable {
                    debug!(source = %spec.source, id = %record.id, "Skipping record without expected provenance");
                }
                usable
            })
            .collect();

        let required = if force { 1 } else { spec.min_batch };
        if records.len() < required {
            debug!(
                source = %spec.source,
                dest = %spec.dest,
                found = records.len(),
                required,
                force,
                "Consolidation below batch threshold"
            );
            return Ok(ConsolidationOutcome::AbortedLowCount {
                found: records.len(),
                required,
            });
        }

        let transcript = render_record_transcript(spec.dest, &records);
        let summary = match self
            .engine
            .summarize(SummaryRequest {
                transcript,
                tier: spec.dest,
            })
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(
                    source = %spec.source,
                    dest = %spec.dest,
                    error = %e,
                    "Summarization failed; sources preserved for next run"
                );
                return Ok(ConsolidationOutcome::AbortedEmptySummary);
            }
        };

        let metadata = derive_provenance(spec.dest, &records, self.offset);
        let record_id = match self
            .store
            .insert(NewMemoryRecord {
                tier: spec.dest,
                summary,
                metadata,
            })
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(
                    dest = %spec.dest,
                    error = %e,
                    "Tier store write failed; summary lost, sources preserved"
                );
                return Err(e);
            }
        };

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let reap_failed = match self.store.delete_by_ids(spec.source, &ids).await {
            Ok(deleted) => {
                if deleted != ids.len() {
                    warn!(
                        source = %spec.source,
                        expected = ids.len(),
                        deleted,
                        "Reap deleted fewer records than consumed"
                    );
                }
                false
            }
            Err(e) => {
                error!(
                    source = %spec.source,
                    dest = %spec.dest,
                    record_id = %record_id,
                    error = %e,
                    "Reap failed after commit; sources will be re-consolidated (manual cleanup needed)"
                );
                true
            }
        };

        info!(
            source = %spec.source,
            dest = %spec.dest,
            consumed = ids.len(),
            record_id = %record_id,
            "Consolidated tier records"
        );

        Ok(ConsolidationOutcome::Committed {
            record_id,
            consumed: ids.len(),
            reap_failed,
        })
    }

    /// Check the buffer thresholds. Returns the trigger that is due, if any.
    pub fn buffer_trigger(
        &self,
        buffer: &ChatBuffer,
        now: DateTime<Utc>,
    ) -> Result<Option<DrainTrigger>> {
        if buffer.len()? >= self.config.buffer_max_events {
            return Ok(Some(DrainTrigger::Size));
        }
        if let Some(age) = buffer.age(now)? {
            if age >= Duration::seconds(self.config.buffer_max_age_secs as i64) {
                return Ok(Some(DrainTrigger::Age));
            }
        }
        Ok(None)
    }

    /// The transfer-tier stage: fold the chat buffer into one record.
    pub async fn drain_buffer(
        &self,
        buffer: &ChatBuffer,
        trigger: DrainTrigger,
    ) -> Result<BufferDrainOutcome> {
        let events = buffer.drain()?;
        if events.is_empty() {
            return Ok(BufferDrainOutcome::Empty);
        }

        if trigger == DrainTrigger::Age && events.len() < self.config.buffer_min_events {
            debug!(
                events = events.len(),
                minimum = self.config.buffer_min_events,
                "Discarding near-empty buffer window without summarizing"
            );
            return Ok(BufferDrainOutcome::Discarded {
                events: events.len(),
            });
        }

        let transcript = render_chat_transcript(&events, self.offset);
        let summary = match self
            .engine
            .summarize(SummaryRequest {
                transcript,
                tier: MemoryTier::Transfer,
            })
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(
                    events = events.len(),
                    error = %e,
                    "Buffer summarization failed; events returned to buffer"
                );
                let count = events.len();
                buffer.restore(events)?;
                return Ok(BufferDrainOutcome::Deferred { events: count });
            }
        };

        let date = events
            .first()
            .map(|e| e.timestamp.with_timezone(&self.offset).date_naive());
        let insert = self
            .store
            .insert(NewMemoryRecord {
                tier: MemoryTier::Transfer,
                summary,
                metadata: Provenance {
                    date,
                    ..Default::default()
                },
            })
            .await;

        match insert {
            Ok(record_id) => {
                info!(
                    events = events.len(),
                    record_id = %record_id,
                    "Buffer summarized into transfer record"
                );
                Ok(BufferDrainOutcome::Summarized {
                    record_id,
                    events: events.len(),
                })
            }
            Err(e) => {
                error!(error = %e, "Transfer record write failed; events returned to buffer");
                buffer.restore(events)?;
                Err(e)
            }
        }
    }

    /// Creation-time bounds of yesterday in the broadcast timezone.
    fn yesterday_range(&self, now: DateTime<Utc>) -> TimeRange {
        let today = now.with_timezone(&self.offset).date_naive();
        let midnight_today = NaiveDateTime::new(today, NaiveTime::MIN);
        let midnight_yesterday = midnight_today - Duration::days(1);

        TimeRange {
            start: self.local_to_utc(midnight_yesterday),
            end: self.local_to_utc(midnight_today) - Duration::microseconds(1),
        }
    }

    fn local_to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self.offset.from_local_datetime(&local) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            // Fixed offsets have no gaps or folds; this arm is unreachable
            // but keeps the conversion total.
            _ => DateTime::from_naive_utc_and_offset(local, Utc),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provenance
// ─────────────────────────────────────────────────────────────────────────────

/// Does `record` carry the metadata the consolidation into `dest` reads?
fn has_required_provenance(dest: MemoryTier, record: &MemoryRecord) -> bool {
    match dest {
        // Transfer records always have a creation time to hang a date on.
        MemoryTier::Transfer | MemoryTier::Daily => true,
        MemoryTier::Weekly => record.metadata.date.is_some(),
        MemoryTier::Monthly => {
            record.metadata.start_date.is_some() && record.metadata.end_date.is_some()
        }
        MemoryTier::Yearly => record.metadata.month.is_some(),
        MemoryTier::Secular => record.metadata.year.is_some(),
    }
}

/// Compute the provenance of a new `dest` record from the records it
/// consumed. Callers have already filtered out records missing the fields
/// each arm reads; fallbacks lean on creation timestamps.
fn derive_provenance(dest: MemoryTier, records: &[MemoryRecord], offset: FixedOffset) -> Provenance {
    let created_date =
        |record: &MemoryRecord| record.created_at.with_timezone(&offset).date_naive();

    match dest {
        MemoryTier::Transfer => Provenance::default(),
        MemoryTier::Daily => {
            let date = records
                .first()
                .map(|r| r.metadata.date.unwrap_or_else(|| created_date(r)));
            Provenance {
                date,
                ..Default::default()
            }
        }
        MemoryTier::Weekly => {
            let dates: Vec<NaiveDate> = records.iter().filter_map(|r| r.metadata.date).collect();
            Provenance {
                start_date: dates.iter().min().copied(),
                end_date: dates.iter().max().copied(),
                ..Default::default()
            }
        }
        MemoryTier::Monthly => {
            let month = records
                .first()
                .and_then(|r| r.metadata.start_date)
                .map(|d| d.format("%Y-%m").to_string());
            Provenance {
                month,
                ..Default::default()
            }
        }
        MemoryTier::Yearly => {
            let year = records.first().map(|r| {
                r.metadata
                    .month
                    .as_deref()
                    .and_then(|m| m.split('-').next())
                    .and_then(|y| y.parse::<i32>().ok())
                    .unwrap_or_else(|| created_date(r).year())
            });
            Provenance {
                year,
                ..Default::default()
            }
        }
        MemoryTier::Secular => {
            let years: Vec<i32> = records.iter().filter_map(|r| r.metadata.year).collect();
            Provenance {
                start_year: years.iter().min().copied(),
                end_year: years.iter().max().copied(),
                ..Default::default()
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transcript rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Framing handed to the engine ahead of the source material, steering it
/// toward one narrative across the input boundaries rather than a list.
fn framing(dest: MemoryTier) -> &'static str {
    match dest {
        MemoryTier::Transfer => {
            "This is a raw transcript of recent Twitch chat. Summarize what was \
             discussed and how the mood moved in one short paragraph, keeping \
             usernames where a moment belongs to someone."
        }
        MemoryTier::Daily => {
            "These are summaries of one day of a Twitch channel's chat. Weave \
             them into a single account of the day: what happened, who drove \
             it, and how it felt. Write flowing prose, not a list."
        }
        MemoryTier::Weekly => {
            "These are daily summaries from one week of a Twitch channel's \
             chat. Connect the events across these days into one narrative of \
             the week, carrying threads and running jokes across day \
             boundaries instead of retelling each day."
        }
        MemoryTier::Monthly => {
            "These are weekly summaries of a Twitch channel's chat. Connect \
             the events across these weeks into the story of the month, \
             keeping whatever arcs outlasted a single week."
        }
        MemoryTier::Yearly => {
            "These are monthly summaries of a Twitch channel's chat. Connect \
             the events across these months into the story of the year: the \
             arcs, the turning points, and what the community became."
        }
        MemoryTier::Secular => {
            "These are yearly summaries of a Twitch channel's chat. Connect \
             the events across these years into a chronicle of the era, \
             keeping only what still matters at that distance."
        }
    }
}

fn render_record_transcript(dest: MemoryTier, records: &[MemoryRecord]) -> String {
    let mut parts = Vec::with_capacity(records.len() + 1);
    parts.push(framing(dest).to_string());

    for record in records {
        match record.metadata.label() {
            Some(label) => parts.push(format!("[{}]\n{}", label, record.summary)),
            None => parts.push(record.summary.clone()),
        }
    }

    parts.join("\n\n")
}

fn render_chat_transcript(events: &[ChatEvent], offset: FixedOffset) -> String {
    let mut parts = Vec::with_capacity(events.len() + 1);
    parts.push(framing(MemoryTier::Transfer).to_string());

    let lines: Vec<String> = events
        .iter()
        .map(|event| {
            format!(
                "[{}] {}: {}",
                event.timestamp.with_timezone(&offset).format("%H:%M"),
                event.user,
                event.content
            )
        })
        .collect();
    parts.push(lines.join("\n"));

    parts.join("\n\n")
}
