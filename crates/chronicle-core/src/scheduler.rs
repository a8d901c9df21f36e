//! Cooperative job scheduler.
//!
//! A single background loop ticks at a short fixed interval and dispatches
//! due jobs synchronously, in registration order. A slow job delays the
//! tick but cannot corrupt state; lateness is tolerated by every consumer
//! of this pipeline. The loop also polls the operator control-signal
//! channel and dispatches force-consolidation instructions.
//!
//! The scheduler is an explicit component: it owns its job table and is
//! handed its collaborators at startup, never reached through globals.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveDateTime,
    NaiveTime, TimeZone, Utc, Weekday,
};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::signal::{ControlChannel, ControlSignal};

type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type JobFn = Box<dyn Fn() -> JobFuture + Send + Sync>;
type SignalFn = Box<dyn Fn(ControlSignal) -> JobFuture + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Triggers
// ─────────────────────────────────────────────────────────────────────────────

/// When a job is due, evaluated in the scheduler's configured offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// At least `period` since the last run (threshold-style checks).
    Every(ChronoDuration),
    /// Once a day at the given wall-clock time.
    DailyAt { hour: u32, minute: u32 },
    /// Once a week on the given weekday.
    WeeklyAt {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
    /// Once a month on the given day of month.
    MonthlyAt { day: u32, hour: u32, minute: u32 },
    /// Once a year on the given month and day.
    YearlyAt {
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
    },
}

impl Trigger {
    /// Whether the job should fire at `now` given when it last ran.
    ///
    /// Wall-clock triggers compare `last_run` against the most recent
    /// scheduled instant, so a loop that was busy at the scheduled moment
    /// fires late rather than never.
    pub fn is_due(
        &self,
        now: DateTime<FixedOffset>,
        last_run: Option<DateTime<FixedOffset>>,
    ) -> bool {
        match self {
            Trigger::Every(period) => last_run.is_none_or(|last| now - last >= *period),
            _ => match self.previous_fire(now) {
                Some(fire) => last_run.is_none_or(|last| last < fire),
                None => false,
            },
        }
    }

    /// The most recent scheduled instant at or before `now`.
    fn previous_fire(&self, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let offset = *now.offset();
        let today = now.date_naive();

        match *self {
            Trigger::Every(_) => None,
            Trigger::DailyAt { hour, minute } => {
                for back in 0..=1 {
                    let date = today - ChronoDuration::days(back);
                    if let Some(fire) = instant_on(date, hour, minute, offset) {
                        if fire <= now {
                            return Some(fire);
                        }
                    }
                }
                None
            }
            Trigger::WeeklyAt {
                weekday,
                hour,
                minute,
            } => {
                for back in 0..=7 {
                    let date = today - ChronoDuration::days(back);
                    if date.weekday() != weekday {
                        continue;
                    }
                    if let Some(fire) = instant_on(date, hour, minute, offset) {
                        if fire <= now {
                            return Some(fire);
                        }
                    }
                }
                None
            }
            Trigger::MonthlyAt { day, hour, minute } => {
                for back in 0..=12 {
                    let (year, month) = months_back(today.year(), today.month(), back);
                    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                        continue; // e.g. day 31 in a short month
                    };
                    if let Some(fire) = instant_on(date, hour, minute, offset) {
                        if fire <= now {
                            return Some(fire);
                        }
                    }
                }
                None
            }
            Trigger::YearlyAt {
                month,
                day,
                hour,
                minute,
            } => {
                for back in 0..=8 {
                    let Some(date) = NaiveDate::from_ymd_opt(today.year() - back, month, day)
                    else {
                        continue; // e.g. Feb 29 off leap years
                    };
                    if let Some(fire) = instant_on(date, hour, minute, offset) {
                        if fire <= now {
                            return Some(fire);
                        }
                    }
                }
                None
            }
        }
    }
}

fn instant_on(
    date: NaiveDate,
    hour: u32,
    minute: u32,
    offset: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    offset
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()
}

fn months_back(year: i32, month: u32, back: i32) -> (i32, u32) {
    let total = year * 12 + month as i32 - 1 - back;
    (total.div_euclid(12), (total.rem_euclid(12) + 1) as u32)
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

struct Job {
    name: String,
    trigger: Trigger,
    last_run: Option<DateTime<FixedOffset>>,
    run: JobFn,
}

struct SignalSource {
    channel: Arc<dyn ControlChannel>,
    poll_every: ChronoDuration,
    last_poll: Option<DateTime<FixedOffset>>,
    dispatch: SignalFn,
}

/// The background scheduling loop.
pub struct Scheduler {
    offset: FixedOffset,
    tick: Duration,
    jobs: Vec<Job>,
    signals: Option<SignalSource>,
}

impl Scheduler {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            tick: Duration::from_secs(1),
            jobs: Vec::new(),
            signals: None,
        }
    }

    /// Override the loop tick interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Register a job. Jobs are dispatched in registration order.
    pub fn add_job<F, Fut>(&mut self, name: &str, trigger: Trigger, run: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.jobs.push(Job {
            name: name.to_string(),
            trigger,
            last_run: None,
            run: Box::new(move || Box::pin(run())),
        });
    }

    /// Attach the operator control-signal channel. Each polled signal is
    /// handed to `dispatch`; consume-once with tolerated duplicates.
    pub fn with_signals<F, Fut>(
        &mut self,
        channel: Arc<dyn ControlChannel>,
        poll_every: ChronoDuration,
        dispatch: F,
    ) where
        F: Fn(ControlSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.signals = Some(SignalSource {
            channel,
            poll_every,
            last_poll: None,
            dispatch: Box::new(move |signal| Box::pin(dispatch(signal))),
        });
    }

    /// Run the loop forever. Spawn this on the runtime and abort the task
    /// to shut down.
    pub async fn run(mut self) {
        info!(jobs = self.jobs.len(), tick = ?self.tick, "Scheduler started");
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick_at(Utc::now()).await;
        }
    }

    /// Run one scheduling pass as of `now`. Public for deterministic tests.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) {
        let now_local = now.with_timezone(&self.offset);

        // Operator intent first, ahead of the regular schedule.
        if let Some(signals) = &mut self.signals {
            let poll_due = signals
                .last_poll
                .is_none_or(|last| now_local - last >= signals.poll_every);

            if poll_due {
                signals.last_poll = Some(now_local);
                match signals.channel.poll_and_clear().await {
                    Ok(pending) => {
                        for signal in pending {
                            info!(signal = %signal, "Dispatching operator signal");
                            if let Err(e) = (signals.dispatch)(signal).await {
                                warn!(signal = %signal, error = %e, "Signal handler failed");
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "Control-signal poll failed"),
                }
            }
        }

        // One failing job never blocks its siblings or the next tick.
        for job in &mut self.jobs {
            if !job.trigger.is_due(now_local, job.last_run) {
                continue;
            }
            job.last_run = Some(now_local);
            debug!(job = %job.name, "Dispatching scheduled job");
            if let Err(e) = (job.run)().await {
                warn!(job = %job.name, error = %e, "Scheduled job failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::MemChannel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(-3 * 3600).unwrap()
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        offset()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .single()
            .unwrap()
    }

    #[test]
    fn test_daily_trigger_fires_once_per_day() {
        let trigger = Trigger::DailyAt { hour: 0, minute: 15 };

        // Before the fire time, with no history: previous fire is yesterday's.
        assert!(trigger.is_due(local(2025, 1, 2, 0, 10), None));

        // Ran at yesterday's slot; today's slot not yet reached.
        let last = Some(local(2025, 1, 1, 0, 15));
        assert!(!trigger.is_due(local(2025, 1, 2, 0, 10), last));

        // Today's slot reached.
        assert!(trigger.is_due(local(2025, 1, 2, 0, 15), last));

        // Firing late still counts once.
        let last = Some(local(2025, 1, 2, 7, 0));
        assert!(!trigger.is_due(local(2025, 1, 2, 23, 0), last));
    }

    #[test]
    fn test_weekly_trigger_matches_weekday() {
        let trigger = Trigger::WeeklyAt {
            weekday: Weekday::Mon,
            hour: 1,
            minute: 0,
        };

        // 2025-01-06 is a Monday.
        let monday_early = local(2025, 1, 6, 0, 30);
        let monday_late = local(2025, 1, 6, 1, 30);
        let last_week = Some(local(2024, 12, 30, 1, 0));

        assert!(!trigger.is_due(monday_early, last_week));
        assert!(trigger.is_due(monday_late, last_week));
    }

    #[test]
    fn test_monthly_trigger_short_months() {
        let trigger = Trigger::MonthlyAt {
            day: 31,
            hour: 1,
            minute: 30,
        };

        // No day 31 in February; the previous fire is January 31.
        let fire = trigger.previous_fire(local(2025, 2, 15, 12, 0)).unwrap();
        assert_eq!(fire.date_naive(), NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
    }

    #[test]
    fn test_yearly_trigger() {
        let trigger = Trigger::YearlyAt {
            month: 1,
            day: 1,
            hour: 2,
            minute: 0,
        };

        let last_year = Some(local(2024, 1, 1, 2, 0));
        assert!(!trigger.is_due(local(2024, 12, 31, 23, 59), last_year));
        assert!(trigger.is_due(local(2025, 1, 1, 2, 0), last_year));
    }

    #[test]
    fn test_every_trigger_spacing() {
        let trigger = Trigger::Every(ChronoDuration::seconds(60));
        let start = local(2025, 1, 1, 12, 0);

        assert!(trigger.is_due(start, None));
        assert!(!trigger.is_due(start + ChronoDuration::seconds(30), Some(start)));
        assert!(trigger.is_due(start + ChronoDuration::seconds(60), Some(start)));
    }

    #[test]
    fn test_months_back_wraps_year() {
        assert_eq!(months_back(2025, 3, 0), (2025, 3));
        assert_eq!(months_back(2025, 3, 3), (2024, 12));
        assert_eq!(months_back(2025, 1, 12), (2024, 1));
    }

    #[tokio::test]
    async fn test_jobs_dispatch_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(offset());

        for name in ["first", "second"] {
            let order = Arc::clone(&order);
            scheduler.add_job(name, Trigger::Every(ChronoDuration::seconds(1)), move || {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(name);
                    Ok(())
                }
            });
        }

        scheduler.tick_at(local(2025, 1, 1, 12, 0).with_timezone(&Utc)).await;
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_failing_job_does_not_starve_siblings() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(offset());

        scheduler.add_job("bad", Trigger::Every(ChronoDuration::seconds(1)), || async {
            Err(crate::error::Error::Other("boom".to_string()))
        });
        let counter = Arc::clone(&ran);
        scheduler.add_job("good", Trigger::Every(ChronoDuration::seconds(1)), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        scheduler.tick_at(local(2025, 1, 1, 12, 0).with_timezone(&Utc)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_signals_polled_and_dispatched_once() {
        let channel = Arc::new(MemChannel::new());
        channel.push(ControlSignal::ForceWeeklySummary).await.unwrap();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(offset());
        {
            let seen = Arc::clone(&seen);
            scheduler.with_signals(
                channel.clone(),
                ChronoDuration::seconds(60),
                move |signal| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.lock().unwrap().push(signal);
                        Ok(())
                    }
                },
            );
        }

        let start = local(2025, 1, 1, 12, 0);
        scheduler.tick_at(start.with_timezone(&Utc)).await;
        assert_eq!(*seen.lock().unwrap(), vec![ControlSignal::ForceWeeklySummary]);

        // Next tick inside the poll interval does not poll again; the
        // channel is empty either way.
        scheduler
            .tick_at((start + ChronoDuration::seconds(1)).with_timezone(&Utc))
            .await;
        scheduler
            .tick_at((start + ChronoDuration::seconds(61)).with_timezone(&Utc))
            .await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
