//! Durable JSON document holding tasks, statistics and the active day.
//!
//! Every mutation runs through [`Database::transaction`]: the closure edits a
//! copy of the current [`Snapshot`], the copy is written with
//! [`atomic_write`](super::atomic_write) and only then becomes visible to
//! readers and watchers. A failed closure or a failed write leaves both the
//! file and the in-memory state untouched.

use super::files::{atomic_write, backup_file, read_file};
use crate::domain::{NewTask, Task, TaskId, TaskStatistic};
use crate::error::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Full contents of the store file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Last id handed out; ids are never reused
    #[serde(default)]
    pub last_task_id: TaskId,
    #[serde(default)]
    pub tasks: BTreeMap<TaskId, Task>,
    /// One row per (task, day); stored on disk as a plain array
    #[serde(default, with = "statistic_rows")]
    pub statistics: BTreeMap<(TaskId, NaiveDate), TaskStatistic>,
    /// Day for which `time_completed_today_ms` is valid; `None` before the first check
    #[serde(default)]
    pub active_day: Option<NaiveDate>,
}

impl Snapshot {
    pub fn insert_task(&mut self, new_task: NewTask) -> Task {
        self.last_task_id += 1;
        let task = Task {
            id: self.last_task_id,
            name: new_task.name,
            daily_goal_minutes: new_task.daily_goal_minutes,
            time_completed_today_ms: 0,
            weekdays: new_task.weekdays,
            archived: false,
        };
        self.tasks.insert(task.id, task.clone());
        task
    }

    /// Remove a task and every statistic that belongs to it
    pub fn remove_task(&mut self, id: TaskId) -> bool {
        if self.tasks.remove(&id).is_none() {
            return false;
        }
        self.statistics.retain(|(task_id, _), _| *task_id != id);
        true
    }

    /// Add `delta_ms` to a task's progress; `None` if the task is gone
    pub fn add_progress(&mut self, id: TaskId, delta_ms: u64) -> Option<&Task> {
        let task = self.tasks.get_mut(&id)?;
        task.time_completed_today_ms = task.time_completed_today_ms.saturating_add(delta_ms);
        Some(task)
    }

    pub fn reset_progress(&mut self, id: TaskId) -> bool {
        match self.tasks.get_mut(&id) {
            Some(task) => {
                task.time_completed_today_ms = 0;
                true
            }
            None => false,
        }
    }

    /// Reset every task's progress, returning how many had any
    pub fn reset_all_progress(&mut self) -> usize {
        let mut reset = 0;
        for task in self.tasks.values_mut() {
            if task.time_completed_today_ms > 0 {
                reset += 1;
            }
            task.time_completed_today_ms = 0;
        }
        reset
    }

    /// Insert a statistic, replacing any existing row with the same (task, day)
    pub fn insert_statistic(&mut self, statistic: TaskStatistic) {
        self.statistics.insert(statistic.key(), statistic);
    }

    /// Tasks that get a statistic at rollover: active ones, plus archived ones with progress
    pub fn rollover_candidates(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .values()
            .filter(|task| !task.archived || task.time_completed_today_ms > 0)
    }
}

mod statistic_rows {
    use super::{BTreeMap, NaiveDate, TaskId, TaskStatistic};
    use serde::{Deserialize, Deserializer, Serializer};

    type Rows = BTreeMap<(TaskId, NaiveDate), TaskStatistic>;

    pub fn serialize<S: Serializer>(rows: &Rows, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(rows.values())
    }

    /// Later rows win when a file holds duplicate keys
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Rows, D::Error> {
        let rows = Vec::<TaskStatistic>::deserialize(deserializer)?;
        Ok(rows.into_iter().map(|row| (row.key(), row)).collect())
    }
}

/// Shared handle to the store document.
pub struct Database {
    path: Option<PathBuf>,
    state: Mutex<Snapshot>,
    tx: watch::Sender<Arc<Snapshot>>,
}

impl Database {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// A file that cannot be parsed is backed up and replaced by an empty document.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = read_file(&path)?;

        let snapshot = if content.trim().is_empty() {
            Snapshot::default()
        } else {
            match serde_json::from_str::<Snapshot>(&content) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    let backup = backup_file(&path)?;
                    warn!(
                        path = %path.display(),
                        backup = %backup.display(),
                        error = %e,
                        "store file is unreadable, starting from an empty store"
                    );
                    Snapshot::default()
                }
            }
        };

        debug!(
            path = %path.display(),
            tasks = snapshot.tasks.len(),
            statistics = snapshot.statistics.len(),
            "store opened"
        );
        Ok(Self::with_snapshot(Some(path), snapshot))
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self::with_snapshot(None, Snapshot::default())
    }

    fn with_snapshot(path: Option<PathBuf>, snapshot: Snapshot) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(snapshot.clone()));
        Self {
            path,
            state: Mutex::new(snapshot),
            tx,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Latest committed document
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    /// Receiver that sees every committed document
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    /// Run `f` against a copy of the document and commit it atomically.
    ///
    /// Transactions are serialized. Nothing is written or published when the
    /// closure leaves the document unchanged.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        let out = f(&mut next)?;

        if next != *guard {
            self.persist(&next)?;
            *guard = next;
            self.tx.send_replace(Arc::new(guard.clone()));
        }
        Ok(out)
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        // A panic inside a transaction never commits, so the guarded state is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(snapshot)?;
            atomic_write(path, &json)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut snapshot = Snapshot::default();
        let first = snapshot.insert_task(NewTask::new("A", 10));
        snapshot.remove_task(first.id);
        let second = snapshot.insert_task(NewTask::new("B", 10));
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[test]
    fn test_insert_statistic_replaces_same_key() {
        let mut snapshot = Snapshot::default();
        let task = snapshot.insert_task(NewTask::new("A", 10));
        let mut stat = TaskStatistic::capture(&task, day(1));
        snapshot.insert_statistic(stat.clone());
        stat.completed_ms = 5_000;
        snapshot.insert_statistic(stat.clone());
        snapshot.insert_statistic(TaskStatistic::capture(&task, day(2)));

        assert_eq!(snapshot.statistics.len(), 2);
        assert_eq!(snapshot.statistics[&(task.id, day(1))], stat);
    }

    #[test]
    fn test_remove_task_cascades_statistics() {
        let mut snapshot = Snapshot::default();
        let a = snapshot.insert_task(NewTask::new("A", 10));
        let b = snapshot.insert_task(NewTask::new("B", 10));
        snapshot.insert_statistic(TaskStatistic::capture(&a, day(1)));
        snapshot.insert_statistic(TaskStatistic::capture(&b, day(1)));

        assert!(snapshot.remove_task(a.id));
        assert!(!snapshot.remove_task(a.id));
        let keys: Vec<(TaskId, NaiveDate)> = snapshot.statistics.keys().copied().collect();
        assert_eq!(keys, vec![(b.id, day(1))]);
    }

    #[test]
    fn test_rollover_candidates() {
        let mut snapshot = Snapshot::default();
        let active = snapshot.insert_task(NewTask::new("Active", 10));
        let idle_archived = snapshot.insert_task(NewTask::new("Old", 10));
        let busy_archived = snapshot.insert_task(NewTask::new("Busy", 10));
        snapshot.tasks.get_mut(&idle_archived.id).unwrap().archived = true;
        snapshot.tasks.get_mut(&busy_archived.id).unwrap().archived = true;
        snapshot.add_progress(busy_archived.id, 1_000);

        let ids: Vec<TaskId> = snapshot.rollover_candidates().map(|t| t.id).collect();
        assert_eq!(ids, vec![active.id, busy_archived.id]);
    }

    #[test]
    fn test_transaction_persists_and_reloads() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("store.json");

        let db = Database::open(&path).unwrap();
        db.transaction(|s| {
            let task = s.insert_task(NewTask::new("Read", 10));
            s.add_progress(task.id, 42_000);
            s.active_day = Some(day(3));
            Ok(())
        })
        .unwrap();

        let reopened = Database::open(&path).unwrap();
        assert_eq!(*reopened.snapshot(), *db.snapshot());
        assert_eq!(reopened.snapshot().tasks[&1].time_completed_today_ms, 42_000);
    }

    #[test]
    fn test_failed_transaction_changes_nothing() {
        let db = Database::in_memory();
        let mut rx = db.subscribe();

        let result: Result<()> = db.transaction(|s| {
            s.insert_task(NewTask::new("Read", 10));
            Err(Error::InvalidTask("nope".to_string()))
        });

        assert!(result.is_err());
        assert!(db.snapshot().tasks.is_empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_unchanged_transaction_does_not_publish() {
        let db = Database::in_memory();
        let mut rx = db.subscribe();
        db.transaction(|s| Ok(s.reset_all_progress())).unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_statistics_round_trip_as_array_and_dedupe() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("store.json");
        atomic_write(
            &path,
            r#"{
                "last_task_id": 1,
                "statistics": [
                    { "task_id": 1, "day": "2024-01-01", "goal_minutes": 10, "completed_ms": 1000 },
                    { "task_id": 1, "day": "2024-01-01", "goal_minutes": 10, "completed_ms": 2000 },
                    { "task_id": 1, "day": "2024-01-02", "goal_minutes": 10, "completed_ms": 0 }
                ]
            }"#,
        )
        .unwrap();

        let db = Database::open(&path).unwrap();
        let snapshot = db.snapshot();
        assert_eq!(snapshot.statistics.len(), 2);
        assert_eq!(snapshot.statistics[&(1, day(1))].completed_ms, 2_000);

        let json: serde_json::Value = serde_json::to_value(&*snapshot).unwrap();
        assert_eq!(json["statistics"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_backed_up() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("store.json");
        atomic_write(&path, "{ not json").unwrap();

        let db = Database::open(&path).unwrap();
        assert_eq!(*db.snapshot(), Snapshot::default());

        let backups: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".bak."))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
