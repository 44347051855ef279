//! Countdown timer for the selected task.
//!
//! [`TaskTimer`] runs at most one task at a time. Elapsed wall-clock time is
//! written to the task store as relative deltas ("flushes") when the timer
//! stops, when the selection switches, when the goal is reached, and
//! periodically while running so a crash loses at most one flush interval.
//!
//! While running, a background ticker emits [`TimerEvent::Progress`] every
//! tick and wakes exactly at the goal boundary, where the timer stops itself
//! and emits [`TimerEvent::TaskFinished`].
//!
//! Methods that start the timer spawn the ticker and must be called from
//! within a Tokio runtime.

use crate::config::Config;
use crate::domain::{Task, TaskId, TimerStatus};
use crate::error::{Error, Result};
use crate::persistence::{PreferencesStore, TaskStore};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Timer state changes, broadcast to any number of subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Started { task_id: TaskId },
    /// Emitted every tick while running; `completed_ms` includes unflushed time
    Progress {
        task_id: TaskId,
        completed_ms: u64,
        goal_ms: u64,
    },
    Stopped { task_id: TaskId, flushed_ms: u64 },
    /// The running task reached its daily goal; sent once, after `Stopped`
    TaskFinished { task_id: TaskId, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    pub tick_interval: Duration,
    /// Unflushed time that triggers a write while running
    pub flush_interval: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for TimerSettings {
    fn from(config: &Config) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            flush_interval: config.flush_interval(),
        }
    }
}

/// Live figures for the selected task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerProgress {
    pub task: Task,
    pub status: TimerStatus,
    /// Persisted progress plus time not yet flushed
    pub completed_ms: u64,
}

impl TimerProgress {
    pub fn remaining_ms(&self) -> u64 {
        self.task.goal_ms().saturating_sub(self.completed_ms)
    }
}

/// Handle to the task timer; clones share the same session.
#[derive(Clone)]
pub struct TaskTimer {
    inner: Arc<Inner>,
}

struct Inner {
    tasks: TaskStore,
    preferences: Arc<PreferencesStore>,
    events: broadcast::Sender<TimerEvent>,
    session: Mutex<Session>,
    settings: TimerSettings,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Session {
    selected: Option<TaskId>,
    running: Option<Running>,
    generation: u64,
}

struct Running {
    task_id: TaskId,
    last_flush: Instant,
    /// Distinguishes this run from later ones so a stale ticker can't act on them
    generation: u64,
    ticker: CancellationToken,
}

impl Running {
    fn pending_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.last_flush).as_millis() as u64
    }
}

impl TaskTimer {
    /// Create a stopped timer, restoring the persisted selection if that task still exists.
    ///
    /// Tickers are children of `cancel` and exit when it is cancelled.
    pub fn new(
        tasks: TaskStore,
        preferences: Arc<PreferencesStore>,
        settings: TimerSettings,
        cancel: CancellationToken,
    ) -> Self {
        let selected = preferences
            .selected_task()
            .filter(|id| tasks.get(*id).is_some());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                tasks,
                preferences,
                events,
                session: Mutex::new(Session {
                    selected,
                    ..Session::default()
                }),
                settings,
                cancel,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> TimerStatus {
        if self.inner.lock().running.is_some() {
            TimerStatus::Running
        } else {
            TimerStatus::Stopped
        }
    }

    pub fn selected_task(&self) -> Option<TaskId> {
        self.inner.lock().selected
    }

    pub fn running_task(&self) -> Option<TaskId> {
        self.inner.lock().running.as_ref().map(|r| r.task_id)
    }

    /// Current figures for the selected task, including unflushed time
    pub fn progress(&self) -> Option<TimerProgress> {
        let session = self.inner.lock();
        let (task_id, pending_ms, status) = match &session.running {
            Some(running) => (
                running.task_id,
                running.pending_ms(Instant::now()),
                TimerStatus::Running,
            ),
            None => (session.selected?, 0, TimerStatus::Stopped),
        };
        let task = self.inner.tasks.get(task_id)?;

        Some(TimerProgress {
            completed_ms: task.time_completed_today_ms + pending_ms,
            task,
            status,
        })
    }

    /// Point the timer at another task.
    ///
    /// If a different task is running it is stopped and its time flushed
    /// before the switch; the new task is left stopped.
    pub fn select_task(&self, task_id: TaskId) -> Result<()> {
        if self.inner.tasks.get(task_id).is_none() {
            return Err(Error::TaskNotFound(task_id));
        }

        let mut session = self.inner.lock();
        if session.selected == Some(task_id) {
            return Ok(());
        }

        let switching = session
            .running
            .as_ref()
            .map_or(false, |running| running.task_id != task_id);
        if switching {
            self.inner.stop_locked(&mut session)?;
        }

        session.selected = Some(task_id);
        self.inner.remember_selection(Some(task_id));
        info!(task_id, "task selected");
        Ok(())
    }

    /// Start measuring from now.
    ///
    /// Returns `false` when already running, when nothing is selected, when
    /// the selected task is gone (the selection is cleared), or when today's
    /// goal is already reached.
    pub fn start(&self) -> bool {
        let mut session = self.inner.lock();
        if session.running.is_some() || self.inner.cancel.is_cancelled() {
            return false;
        }

        let Some(task_id) = session.selected else {
            debug!("start ignored, no task selected");
            return false;
        };

        let Some(task) = self.inner.tasks.get(task_id) else {
            warn!(task_id, "selected task no longer exists, clearing selection");
            session.selected = None;
            self.inner.remember_selection(None);
            return false;
        };

        if task.is_completed_today() {
            info!(task_id, name = %task.name, "daily goal already reached, not starting");
            return false;
        }

        session.generation += 1;
        let generation = session.generation;
        let ticker = self.inner.cancel.child_token();
        session.running = Some(Running {
            task_id,
            last_flush: Instant::now(),
            generation,
            ticker: ticker.clone(),
        });

        tokio::spawn(run_ticker(Arc::clone(&self.inner), generation, ticker));

        let _ = self.inner.events.send(TimerEvent::Started { task_id });
        info!(task_id, name = %task.name, remaining_ms = task.remaining_ms(), "timer started");
        true
    }

    /// Flush elapsed time and stop. Returns the flushed milliseconds (0 when already stopped).
    pub fn stop(&self) -> Result<u64> {
        let mut session = self.inner.lock();
        self.inner.stop_locked(&mut session)
    }

    /// Persist elapsed time without stopping
    pub fn flush(&self) -> Result<u64> {
        let mut session = self.inner.lock();
        self.inner.flush_locked(&mut session)
    }

    /// Stop the timer if `task_id` is the running task.
    ///
    /// Called before a task is deleted, archived or reset so no stale timer
    /// keeps counting against it.
    pub fn stop_timer_if_task_is_active(&self, task_id: TaskId) -> Result<u64> {
        let mut session = self.inner.lock();
        let active = session
            .running
            .as_ref()
            .map_or(false, |running| running.task_id == task_id);
        if !active {
            return Ok(0);
        }
        let flushed = self.inner.stop_locked(&mut session)?;
        info!(task_id, flushed_ms = flushed, "timer force-stopped");
        Ok(flushed)
    }

    /// Drop the selection if it points at `task_id` (after a delete)
    pub fn forget_task(&self, task_id: TaskId) {
        let mut session = self.inner.lock();
        if session.selected == Some(task_id) {
            session.selected = None;
            self.inner.remember_selection(None);
        }
    }

    /// Stop the timer and run `f` before anything can start it again.
    ///
    /// If the flush fails the timer keeps running and `f` is not called.
    pub fn with_timer_stopped<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let mut session = self.inner.lock();
        self.inner.stop_locked(&mut session)?;
        f()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remember_selection(&self, task_id: Option<TaskId>) {
        if let Err(e) = self.preferences.set_selected_task(task_id) {
            warn!(error = %e, "could not persist selected task");
        }
    }

    fn flush_locked(&self, session: &mut Session) -> Result<u64> {
        let Some(running) = session.running.as_mut() else {
            return Ok(0);
        };
        let ms = running.pending_ms(Instant::now());
        if ms == 0 {
            return Ok(0);
        }

        self.tasks.add_progress(running.task_id, ms)?;
        // Advance by whole milliseconds so sub-ms remainders carry into the next flush
        running.last_flush += Duration::from_millis(ms);
        Ok(ms)
    }

    fn stop_locked(&self, session: &mut Session) -> Result<u64> {
        let flushed = self.flush_locked(session)?;
        let Some(running) = session.running.take() else {
            return Ok(0);
        };
        running.ticker.cancel();

        let _ = self.events.send(TimerEvent::Stopped {
            task_id: running.task_id,
            flushed_ms: flushed,
        });
        info!(task_id = running.task_id, flushed_ms = flushed, "timer stopped");
        Ok(flushed)
    }

    /// How long the ticker for `generation` should sleep, or `None` if that run is over
    fn next_wake(&self, generation: u64) -> Option<Duration> {
        let session = self.lock();
        let running = session
            .running
            .as_ref()
            .filter(|running| running.generation == generation)?;

        let Some(task) = self.tasks.get(running.task_id) else {
            return Some(Duration::ZERO);
        };
        let completed = task.time_completed_today_ms + running.pending_ms(Instant::now());
        let remaining = Duration::from_millis(task.goal_ms().saturating_sub(completed));
        Some(self.settings.tick_interval.min(remaining))
    }

    /// Returns whether the ticker should keep going
    fn on_tick(&self, generation: u64) -> Result<bool> {
        let mut session = self.lock();
        let Some(running) = session
            .running
            .as_ref()
            .filter(|running| running.generation == generation)
        else {
            return Ok(false);
        };
        let task_id = running.task_id;
        let pending = running.pending_ms(Instant::now());

        let Some(task) = self.tasks.get(task_id) else {
            warn!(task_id, "running task disappeared, stopping timer");
            self.stop_locked(&mut session)?;
            return Ok(false);
        };

        let completed = task.time_completed_today_ms + pending;
        let goal_ms = task.goal_ms();
        if completed >= goal_ms {
            self.stop_locked(&mut session)?;
            let _ = self.events.send(TimerEvent::TaskFinished {
                task_id,
                name: task.name.clone(),
            });
            info!(task_id, name = %task.name, "daily goal reached");
            return Ok(false);
        }

        if pending >= self.settings.flush_interval.as_millis() as u64 {
            self.flush_locked(&mut session)?;
        }

        let _ = self.events.send(TimerEvent::Progress {
            task_id,
            completed_ms: completed,
            goal_ms,
        });
        Ok(true)
    }
}

async fn run_ticker(inner: Arc<Inner>, generation: u64, cancel: CancellationToken) {
    let mut retry = false;

    loop {
        let wait = if retry {
            inner.settings.tick_interval
        } else {
            match inner.next_wake(generation) {
                Some(wait) => wait,
                None => break,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        match inner.on_tick(generation) {
            Ok(true) => retry = false,
            Ok(false) => break,
            Err(e) => {
                warn!(error = %e, "timer tick failed, retrying");
                retry = true;
            }
        }
    }

    debug!(generation, "ticker exited");
}
