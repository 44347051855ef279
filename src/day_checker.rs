//! Calendar day rollover.
//!
//! [`DayChecker`] polls the clock and compares today with the persisted
//! active day. When the calendar has moved forward it closes the previous
//! day in a single store transaction: one [`TaskStatistic`] per task that
//! should be recorded, every task's progress reset to zero, and the active
//! day advanced. The task timer is stopped and flushed first, and stays
//! locked until the transaction commits.
//!
//! The active day only ever moves forward. A clock that jumps backwards is
//! ignored, and a gap of several days yields one snapshot for the last
//! active day.

use crate::clock::Clock;
use crate::config::DEFAULT_DAY_CHECK_SECS;
use crate::domain::TaskStatistic;
use crate::error::Result;
use crate::persistence::{Database, Snapshot};
use crate::timer::TaskTimer;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

/// What a rollover did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloverReport {
    /// Day the statistics were recorded for
    pub previous_day: NaiveDate,
    pub new_day: NaiveDate,
    pub statistics_written: usize,
    /// Tasks whose progress was non-zero before the reset
    pub tasks_reset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayEvent {
    /// First check ever; nothing to close
    Initialized { day: NaiveDate },
    RolledOver(RolloverReport),
}

/// Close the active day if `today` is later, or set it on first use.
///
/// Returns `None` when there is nothing to do.
pub fn close_day(snapshot: &mut Snapshot, today: NaiveDate) -> Option<DayEvent> {
    match snapshot.active_day {
        None => {
            snapshot.active_day = Some(today);
            Some(DayEvent::Initialized { day: today })
        }
        Some(previous) if today > previous => {
            let statistics: Vec<TaskStatistic> = snapshot
                .rollover_candidates()
                .map(|task| TaskStatistic::capture(task, previous))
                .collect();
            let statistics_written = statistics.len();
            for statistic in statistics {
                snapshot.insert_statistic(statistic);
            }
            let tasks_reset = snapshot.reset_all_progress();
            snapshot.active_day = Some(today);

            Some(DayEvent::RolledOver(RolloverReport {
                previous_day: previous,
                new_day: today,
                statistics_written,
                tasks_reset,
            }))
        }
        Some(_) => None,
    }
}

/// Polls for a new calendar day until cancelled.
pub struct DayChecker {
    db: Arc<Database>,
    timer: TaskTimer,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<DayEvent>,
    cancel: CancellationToken,
    poll_interval: Duration,
}

impl DayChecker {
    pub fn new(
        db: Arc<Database>,
        timer: TaskTimer,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            db,
            timer,
            clock,
            events,
            cancel,
            poll_interval: Duration::from_secs(DEFAULT_DAY_CHECK_SECS),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DayEvent> {
        self.events.subscribe()
    }

    /// Run one check now
    pub fn check(&self) -> Result<Option<DayEvent>> {
        let today = self.clock.today();
        let active = self.db.snapshot().active_day;

        let event = match active {
            Some(active) if today <= active => {
                if today < active {
                    debug!(%today, %active, "clock is behind the active day, ignoring");
                }
                return Ok(None);
            }
            Some(_) => self
                .timer
                .with_timer_stopped(|| self.db.transaction(|s| Ok(close_day(s, today))))?,
            None => self.db.transaction(|s| Ok(close_day(s, today)))?,
        };

        match &event {
            Some(DayEvent::Initialized { day }) => info!(%day, "active day initialized"),
            Some(DayEvent::RolledOver(report)) => info!(
                previous_day = %report.previous_day,
                new_day = %report.new_day,
                statistics = report.statistics_written,
                tasks_reset = report.tasks_reset,
                "day rolled over"
            ),
            None => {}
        }
        if let Some(event) = &event {
            let _ = self.events.send(event.clone());
        }
        Ok(event)
    }

    /// Check immediately, then every poll interval, until cancelled
    pub async fn run(self) {
        info!(interval_secs = self.poll_interval.as_secs(), "day checker started");

        loop {
            if let Err(e) = self.check() {
                warn!(error = %e, "day check failed, retrying next poll");
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("day checker stopped");
    }
}
