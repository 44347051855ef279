//! Application context: the stores, the timer and the day checker wired
//! around one data directory.

use crate::clock::Clock;
use crate::config::Config;
use crate::day_checker::{DayChecker, DayEvent};
use crate::domain::{NewTask, Task, TaskId, TaskUpdate};
use crate::error::{Error, Result};
use crate::notifications::NotificationForwarder;
use crate::persistence::{
    config_file, database_file, ensure_data_dir, preferences_file, Database, DayStateStore,
    PreferencesStore, StatisticsStore, TaskStore,
};
use crate::report::generate_report;
use crate::timer::{TaskTimer, TimerSettings};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct App {
    data_dir: Option<PathBuf>,
    config: Config,
    db: Arc<Database>,
    tasks: TaskStore,
    statistics: StatisticsStore,
    day_state: DayStateStore,
    timer: TaskTimer,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

/// Handles for the tasks started by [`App::spawn_background`]
pub struct Background {
    pub day_events: broadcast::Receiver<DayEvent>,
    handles: Vec<JoinHandle<()>>,
}

/// Why a timer run ended, read after its `Stopped` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The goal was met; `TaskFinished` follows
    GoalReached,
    /// The day rolled over while the task was running
    NewDay(NaiveDate),
    Stopped,
}

impl Background {
    /// Wait for every background task to exit
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

impl App {
    /// Open the stores in `data_dir`, reading `config.json` from it
    pub fn open(data_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let data_dir: PathBuf = data_dir.into();
        let data_dir = ensure_data_dir(&data_dir)?;
        let config = Config::load(config_file(&data_dir));
        let db = Arc::new(Database::open(database_file(&data_dir))?);
        let preferences = Arc::new(PreferencesStore::open(preferences_file(&data_dir)));
        debug!(data_dir = %data_dir.display(), "stores opened");

        Ok(Self::assemble(Some(data_dir), config, db, preferences, clock))
    }

    /// Nothing touches the disk; reports can't be written
    pub fn in_memory(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self::assemble(
            None,
            config,
            Arc::new(Database::in_memory()),
            Arc::new(PreferencesStore::in_memory()),
            clock,
        )
    }

    fn assemble(
        data_dir: Option<PathBuf>,
        config: Config,
        db: Arc<Database>,
        preferences: Arc<PreferencesStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let tasks = TaskStore::new(db.clone());
        let timer = TaskTimer::new(
            tasks.clone(),
            preferences,
            TimerSettings::from(&config),
            cancel.clone(),
        );

        Self {
            data_dir,
            config,
            statistics: StatisticsStore::new(db.clone()),
            day_state: DayStateStore::new(db.clone()),
            db,
            tasks,
            timer,
            clock,
            cancel,
        }
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn statistics(&self) -> &StatisticsStore {
        &self.statistics
    }

    pub fn day_state(&self) -> &DayStateStore {
        &self.day_state
    }

    pub fn timer(&self) -> &TaskTimer {
        &self.timer
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn create_task(&self, new_task: NewTask) -> Result<Task> {
        self.tasks.create(new_task)
    }

    pub fn edit_task(&self, id: TaskId, update: TaskUpdate) -> Result<Task> {
        self.tasks.update(id, update)
    }

    /// Stop the timer if it runs this task, then delete the task and its statistics
    pub fn delete_task(&self, id: TaskId) -> Result<bool> {
        self.timer.stop_timer_if_task_is_active(id)?;
        let deleted = self.tasks.delete(id)?;
        self.timer.forget_task(id);
        Ok(deleted)
    }

    pub fn set_archived(&self, id: TaskId, archived: bool) -> Result<Task> {
        if archived {
            self.timer.stop_timer_if_task_is_active(id)?;
        }
        self.tasks.set_archived(id, archived)
    }

    /// Zero today's progress for one task
    pub fn reset_task(&self, id: TaskId) -> Result<bool> {
        if self.tasks.get(id).is_none() {
            return Err(Error::TaskNotFound(id));
        }
        self.timer.stop_timer_if_task_is_active(id)?;
        self.tasks.reset_progress(id)
    }

    pub fn day_checker(&self) -> DayChecker {
        DayChecker::new(
            self.db.clone(),
            self.timer.clone(),
            self.clock.clone(),
            self.cancel.clone(),
        )
        .with_poll_interval(self.config.day_check_interval())
    }

    /// Run one day check now
    pub fn check_day(&self) -> Result<Option<DayEvent>> {
        self.day_checker().check()
    }

    /// Start the day checker and the notification forwarder; both stop on [`App::shutdown`]
    pub fn spawn_background(&self) -> Background {
        let checker = self.day_checker();
        let day_events = checker.subscribe();
        let forwarder = NotificationForwarder::new(
            self.timer.subscribe(),
            self.config.notifications,
            self.cancel.clone(),
        );

        Background {
            day_events,
            handles: vec![tokio::spawn(checker.run()), tokio::spawn(forwarder.run())],
        }
    }

    /// Classify a `Stopped` event for `task_id`, which started running on `started_on`.
    ///
    /// Waits for a rollover in progress to commit before reading the store.
    pub fn stop_reason(&self, task_id: TaskId, started_on: Option<NaiveDate>) -> StopReason {
        let _ = self.timer.status();
        match self.day_state.active_day() {
            Some(day) if started_on != Some(day) => StopReason::NewDay(day),
            _ if self.tasks.get(task_id).is_some_and(|t| t.is_completed_today()) => {
                StopReason::GoalReached
            }
            _ => StopReason::Stopped,
        }
    }

    /// Write the markdown report for `day` (flushing a running timer first)
    pub fn report(&self, day: NaiveDate, output: Option<PathBuf>) -> Result<PathBuf> {
        let data_dir = self
            .data_dir
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("in-memory app has no data directory"))?;
        self.timer.flush()?;
        Ok(generate_report(data_dir, &self.db.snapshot(), day, output)?)
    }

    /// Stop the timer, persisting its time, and cancel background work
    pub fn shutdown(&self) -> Result<u64> {
        let flushed = self.timer.stop();
        self.cancel.cancel();
        if let Ok(ms) = &flushed {
            info!(flushed_ms = *ms, "shut down");
        }
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::TimerStatus;
    use std::time::Duration;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn app() -> App {
        App::in_memory(Config::default(), Arc::new(ManualClock::new(day(2))))
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_running_task_stops_timer_and_clears_selection() {
        let app = app();
        let task = app.create_task(NewTask::new("Read", 10)).unwrap();
        app.timer().select_task(task.id).unwrap();
        assert!(app.timer().start());
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(app.delete_task(task.id).unwrap());

        assert_eq!(app.timer().status(), TimerStatus::Stopped);
        assert_eq!(app.timer().selected_task(), None);
        assert!(app.tasks().get(task.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_archive_stops_running_task() {
        let app = app();
        let task = app.create_task(NewTask::new("Read", 10)).unwrap();
        app.timer().select_task(task.id).unwrap();
        app.timer().start();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let archived = app.set_archived(task.id, true).unwrap();

        assert!(archived.archived);
        assert_eq!(archived.time_completed_today_ms, 2_000);
        assert_eq!(app.timer().status(), TimerStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_task_zeroes_progress() {
        let app = app();
        let task = app.create_task(NewTask::new("Read", 10)).unwrap();
        app.timer().select_task(task.id).unwrap();
        app.timer().start();
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert!(app.reset_task(task.id).unwrap());
        assert_eq!(app.tasks().get(task.id).unwrap().time_completed_today_ms, 0);
        assert!(matches!(app.reset_task(99), Err(Error::TaskNotFound(99))));
    }

    #[tokio::test]
    async fn test_in_memory_app_cannot_write_reports() {
        let app = app();
        assert!(app.report(day(2), None).is_err());
    }

    #[tokio::test]
    async fn test_open_persists_between_sessions() {
        let temp_dir = tempdir().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(day(2)));

        let id = {
            let app = App::open(temp_dir.path(), clock.clone()).unwrap();
            app.check_day().unwrap();
            let task = app.create_task(NewTask::new("Read", 10)).unwrap();
            app.timer().select_task(task.id).unwrap();
            app.shutdown().unwrap();
            task.id
        };

        let app = App::open(temp_dir.path(), clock).unwrap();
        assert_eq!(app.tasks().get(id).unwrap().name, "Read");
        assert_eq!(app.timer().selected_task(), Some(id));
        assert_eq!(app.day_state().active_day(), Some(day(2)));
        assert_eq!(app.check_day().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_and_cancels_background() {
        let app = app();
        let task = app.create_task(NewTask::new("Read", 10)).unwrap();
        let background = app.spawn_background();
        app.timer().select_task(task.id).unwrap();
        app.timer().start();
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(app.shutdown().unwrap(), 1_500);
        assert_eq!(app.tasks().get(task.id).unwrap().time_completed_today_ms, 1_500);

        let joined = tokio::time::timeout(Duration::from_secs(1), background.join()).await;
        assert!(joined.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reason_tells_rollover_from_user_stop() {
        let clock = Arc::new(ManualClock::new(day(2)));
        let app = App::in_memory(Config::default(), clock.clone());
        app.check_day().unwrap();
        let task = app.create_task(NewTask::new("Read", 10)).unwrap();
        app.timer().select_task(task.id).unwrap();
        let started_on = app.day_state().active_day();

        app.timer().start();
        tokio::time::sleep(Duration::from_secs(2)).await;
        app.timer().stop().unwrap();
        assert_eq!(app.stop_reason(task.id, started_on), StopReason::Stopped);

        app.timer().start();
        tokio::time::sleep(Duration::from_secs(2)).await;
        clock.advance_days(1);
        app.check_day().unwrap();
        assert_eq!(app.stop_reason(task.id, started_on), StopReason::NewDay(day(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reason_after_goal() {
        let app = app();
        app.check_day().unwrap();
        let task = app.create_task(NewTask::new("Read", 1)).unwrap();
        app.timer().select_task(task.id).unwrap();
        let started_on = app.day_state().active_day();

        app.timer().start();
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(app.timer().status(), TimerStatus::Stopped);
        assert_eq!(app.stop_reason(task.id, started_on), StopReason::GoalReached);
    }
}
