//! Scheduler job table.
//!
//! Builds the background scheduler from config: the buffer threshold check
//! runs every tick, each consolidation tier gets its wall-clock slot, and
//! the operator signal channel maps to forced runs of the same functions.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use chronicle_core::{
    ChatBuffer, Consolidator, ControlChannel, MemoryConfig, MemoryTier, ScheduleConfig, Scheduler,
    TransitionSpec, Trigger,
};

pub fn build_scheduler(
    consolidator: Arc<Consolidator>,
    buffer: Arc<ChatBuffer>,
    signals: Arc<dyn ControlChannel>,
    memory: &MemoryConfig,
    schedule: &ScheduleConfig,
) -> chronicle_core::Result<Scheduler> {
    let mut scheduler = Scheduler::new(memory.local_offset()?);

    // Buffer thresholds are checked on every loop tick.
    {
        let consolidator = Arc::clone(&consolidator);
        let buffer = Arc::clone(&buffer);
        scheduler.add_job(
            "buffer-drain",
            Trigger::Every(ChronoDuration::seconds(1)),
            move || {
                let consolidator = Arc::clone(&consolidator);
                let buffer = Arc::clone(&buffer);
                async move {
                    if let Some(trigger) = consolidator.buffer_trigger(&buffer, Utc::now())? {
                        consolidator.drain_buffer(&buffer, trigger).await?;
                    }
                    Ok(())
                }
            },
        );
    }

    let (dh, dm) = schedule.daily_at;
    let (ww, wh, wm) = schedule.weekly_at;
    let (md, mh, mm) = schedule.monthly_at;
    let (ymo, yd, yh, ym) = schedule.yearly_at;
    let (smo, sd, sh, sm) = schedule.secular_at;

    let slots = [
        (MemoryTier::Daily, Trigger::DailyAt { hour: dh, minute: dm }),
        (
            MemoryTier::Weekly,
            Trigger::WeeklyAt {
                weekday: ww,
                hour: wh,
                minute: wm,
            },
        ),
        (
            MemoryTier::Monthly,
            Trigger::MonthlyAt {
                day: md,
                hour: mh,
                minute: mm,
            },
        ),
        (
            MemoryTier::Yearly,
            Trigger::YearlyAt {
                month: ymo,
                day: yd,
                hour: yh,
                minute: ym,
            },
        ),
        (
            MemoryTier::Secular,
            Trigger::YearlyAt {
                month: smo,
                day: sd,
                hour: sh,
                minute: sm,
            },
        ),
    ];

    for (tier, trigger) in slots {
        let Some(spec) = TransitionSpec::into_tier(tier, memory) else {
            continue;
        };
        let consolidator = Arc::clone(&consolidator);
        let name = format!("consolidate-{}", tier);
        scheduler.add_job(&name, trigger, move || {
            let consolidator = Arc::clone(&consolidator);
            let spec = spec.clone();
            async move { consolidator.run(&spec, false).await.map(|_| ()) }
        });
    }

    // Operator signals become forced runs of the same consolidations.
    let memory = memory.clone();
    scheduler.with_signals(
        signals,
        ChronoDuration::seconds(memory.signal_poll_secs as i64),
        move |signal| {
            let consolidator = Arc::clone(&consolidator);
            let spec = TransitionSpec::into_tier(signal.tier(), &memory);
            async move {
                if let Some(spec) = spec {
                    consolidator.run(&spec, true).await?;
                }
                Ok(())
            }
        },
    );

    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chronicle_core::engine::{EngineError, SummaryRequest, Summarizer};
    use chronicle_core::signal::{ControlSignal, MemChannel};
    use chronicle_core::store::MemStore;
    use chronicle_core::types::{NewMemoryRecord, Provenance};
    use chronicle_core::TierStore;

    struct CannedEngine;

    #[async_trait]
    impl Summarizer for CannedEngine {
        async fn summarize(
            &self,
            _request: SummaryRequest,
        ) -> std::result::Result<String, EngineError> {
            Ok("a consolidated summary".to_string())
        }
    }

    #[tokio::test]
    async fn test_signal_forces_consolidation_through_scheduler() {
        let store = Arc::new(MemStore::new());
        let memory = MemoryConfig {
            utc_offset_hours: 0,
            ..Default::default()
        };

        // Two dailies: below the weekly batch of seven, so only a forced
        // run can consume them.
        for day in 1..=2 {
            store
                .insert(NewMemoryRecord {
                    tier: MemoryTier::Daily,
                    summary: format!("day {}", day),
                    metadata: Provenance {
                        date: chrono::NaiveDate::from_ymd_opt(2025, 1, day),
                        ..Default::default()
                    },
                })
                .await
                .unwrap();
        }

        let consolidator = Arc::new(
            Consolidator::new(store.clone(), Arc::new(CannedEngine), memory.clone()).unwrap(),
        );
        let buffer = Arc::new(ChatBuffer::new());
        let channel = Arc::new(MemChannel::new());
        channel.push(ControlSignal::ForceWeeklySummary).await.unwrap();

        let mut scheduler = build_scheduler(
            consolidator,
            buffer,
            channel,
            &memory,
            &ScheduleConfig::default(),
        )
        .unwrap();

        // One pass at an arbitrary instant: the signal fires, the
        // wall-clock jobs find nothing due to consume.
        scheduler.tick_at(Utc::now()).await;

        assert_eq!(store.count(MemoryTier::Daily), 0);
        assert_eq!(store.count(MemoryTier::Weekly), 1);
    }
}
