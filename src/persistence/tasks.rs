use super::database::Database;
use crate::domain::{validate_task, NewTask, Task, TaskId, TaskUpdate};
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

/// Task table contract over the shared [`Database`]
#[derive(Clone)]
pub struct TaskStore {
    db: Arc<Database>,
}

impl TaskStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a task; the name is trimmed and must be non-empty, the goal positive
    pub fn create(&self, new_task: NewTask) -> Result<Task> {
        let name = validate_task(&new_task.name, new_task.daily_goal_minutes)
            .map_err(Error::InvalidTask)?;
        let task = self
            .db
            .transaction(|s| Ok(s.insert_task(NewTask { name, ..new_task })))?;
        info!(task_id = task.id, name = %task.name, goal_minutes = task.daily_goal_minutes, "task created");
        Ok(task)
    }

    /// Edit name, goal or weekdays; progress is kept
    pub fn update(&self, id: TaskId, update: TaskUpdate) -> Result<Task> {
        self.db.transaction(|s| {
            let task = s.tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;
            let name = update.name.as_deref().unwrap_or(&task.name);
            let goal = update.daily_goal_minutes.unwrap_or(task.daily_goal_minutes);
            task.name = validate_task(name, goal).map_err(Error::InvalidTask)?;
            task.daily_goal_minutes = goal;
            if let Some(weekdays) = update.weekdays {
                task.weekdays = weekdays;
            }
            Ok(task.clone())
        })
    }

    /// Delete a task and its statistics; `false` if it did not exist
    pub fn delete(&self, id: TaskId) -> Result<bool> {
        let removed = self.db.transaction(|s| Ok(s.remove_task(id)))?;
        if removed {
            info!(task_id = id, "task deleted");
        }
        Ok(removed)
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.db.snapshot().tasks.get(&id).cloned()
    }

    /// Stream of a task's latest state, starting with the current one; `None` once deleted
    pub fn watch(&self, id: TaskId) -> impl Stream<Item = Option<Task>> + Send + 'static {
        WatchStream::new(self.db.subscribe()).map(move |s| s.tasks.get(&id).cloned())
    }

    pub fn all(&self) -> Vec<Task> {
        self.db.snapshot().tasks.values().cloned().collect()
    }

    pub fn watch_all(&self) -> impl Stream<Item = Vec<Task>> + Send + 'static {
        WatchStream::new(self.db.subscribe()).map(|s| s.tasks.values().cloned().collect())
    }

    pub fn non_archived(&self) -> Vec<Task> {
        self.db
            .snapshot()
            .tasks
            .values()
            .filter(|t| !t.archived)
            .cloned()
            .collect()
    }

    pub fn archived_with_progress_today(&self) -> Vec<Task> {
        self.db
            .snapshot()
            .tasks
            .values()
            .filter(|t| t.archived && t.time_completed_today_ms > 0)
            .cloned()
            .collect()
    }

    /// Add `delta_ms` to today's progress.
    ///
    /// Returns the updated task, or `None` if it no longer exists.
    pub fn add_progress(&self, id: TaskId, delta_ms: u64) -> Result<Option<Task>> {
        if delta_ms == 0 {
            return Ok(self.get(id));
        }
        let task = self
            .db
            .transaction(|s| Ok(s.add_progress(id, delta_ms).cloned()))?;
        match &task {
            Some(t) => debug!(task_id = id, delta_ms, total_ms = t.time_completed_today_ms, "progress added"),
            None => debug!(task_id = id, delta_ms, "progress dropped, task is gone"),
        }
        Ok(task)
    }

    pub fn reset_progress(&self, id: TaskId) -> Result<bool> {
        self.db.transaction(|s| Ok(s.reset_progress(id)))
    }

    pub fn reset_all_progress(&self) -> Result<usize> {
        self.db.transaction(|s| Ok(s.reset_all_progress()))
    }

    pub fn set_archived(&self, id: TaskId, archived: bool) -> Result<Task> {
        self.db.transaction(|s| {
            let task = s.tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;
            task.archived = archived;
            Ok(task.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskStatistic, Weekdays};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn store() -> TaskStore {
        TaskStore::new(Arc::new(Database::in_memory()))
    }

    #[test]
    fn test_create_assigns_ids_and_trims() {
        let tasks = store();
        let a = tasks.create(NewTask::new("  Read ", 10)).unwrap();
        let b = tasks.create(NewTask::new("Write", 15)).unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(a.name, "Read");
        assert_eq!(b.id, 2);
        assert_eq!(tasks.all().len(), 2);
    }

    #[test]
    fn test_create_rejects_invalid_input() {
        let tasks = store();
        assert!(matches!(
            tasks.create(NewTask::new("", 10)),
            Err(Error::InvalidTask(_))
        ));
        assert!(matches!(
            tasks.create(NewTask::new("Read", 0)),
            Err(Error::InvalidTask(_))
        ));
        assert!(tasks.all().is_empty());
    }

    #[test]
    fn test_update_keeps_progress() {
        let tasks = store();
        let task = tasks.create(NewTask::new("Read", 10)).unwrap();
        tasks.add_progress(task.id, 30_000).unwrap();

        let updated = tasks
            .update(
                task.id,
                TaskUpdate {
                    name: Some("Read more".to_string()),
                    daily_goal_minutes: Some(20),
                    weekdays: Some(Weekdays::weekends()),
                },
            )
            .unwrap();

        assert_eq!(updated.name, "Read more");
        assert_eq!(updated.daily_goal_minutes, 20);
        assert_eq!(updated.weekdays, Weekdays::weekends());
        assert_eq!(updated.time_completed_today_ms, 30_000);

        assert!(matches!(
            tasks.update(task.id, TaskUpdate { daily_goal_minutes: Some(0), ..Default::default() }),
            Err(Error::InvalidTask(_))
        ));
        assert!(matches!(
            tasks.update(99, TaskUpdate::default()),
            Err(Error::TaskNotFound(99))
        ));
    }

    #[test]
    fn test_add_progress_is_relative() {
        let tasks = store();
        let task = tasks.create(NewTask::new("Read", 10)).unwrap();

        tasks.add_progress(task.id, 1_500).unwrap();
        let updated = tasks.add_progress(task.id, 2_500).unwrap().unwrap();
        assert_eq!(updated.time_completed_today_ms, 4_000);

        assert_eq!(tasks.add_progress(42, 1_000).unwrap(), None);
    }

    #[test]
    fn test_reset_progress() {
        let tasks = store();
        let a = tasks.create(NewTask::new("A", 10)).unwrap();
        let b = tasks.create(NewTask::new("B", 10)).unwrap();
        tasks.add_progress(a.id, 1_000).unwrap();
        tasks.add_progress(b.id, 2_000).unwrap();

        assert!(tasks.reset_progress(a.id).unwrap());
        assert_eq!(tasks.get(a.id).unwrap().time_completed_today_ms, 0);
        assert_eq!(tasks.get(b.id).unwrap().time_completed_today_ms, 2_000);

        assert_eq!(tasks.reset_all_progress().unwrap(), 1);
        assert!(tasks.all().iter().all(|t| t.time_completed_today_ms == 0));
    }

    #[test]
    fn test_archive_filters() {
        let tasks = store();
        let a = tasks.create(NewTask::new("A", 10)).unwrap();
        let b = tasks.create(NewTask::new("B", 10)).unwrap();
        let c = tasks.create(NewTask::new("C", 10)).unwrap();
        tasks.add_progress(b.id, 1_000).unwrap();
        tasks.set_archived(b.id, true).unwrap();
        tasks.set_archived(c.id, true).unwrap();

        let active: Vec<TaskId> = tasks.non_archived().iter().map(|t| t.id).collect();
        assert_eq!(active, vec![a.id]);
        let busy: Vec<TaskId> = tasks
            .archived_with_progress_today()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(busy, vec![b.id]);

        tasks.set_archived(c.id, false).unwrap();
        assert_eq!(tasks.non_archived().len(), 2);
    }

    #[test]
    fn test_delete_cascades_statistics() {
        let db = Arc::new(Database::in_memory());
        let tasks = TaskStore::new(db.clone());
        let task = tasks.create(NewTask::new("Read", 10)).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        db.transaction(|s| {
            s.insert_statistic(TaskStatistic::capture(&task, day));
            Ok(())
        })
        .unwrap();

        assert!(tasks.delete(task.id).unwrap());
        assert!(!tasks.delete(task.id).unwrap());
        assert!(db.snapshot().statistics.is_empty());
    }

    #[tokio::test]
    async fn test_watch_streams_updates() {
        let tasks = store();
        let task = tasks.create(NewTask::new("Read", 10)).unwrap();
        let mut stream = Box::pin(tasks.watch(task.id));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.time_completed_today_ms, 0);

        tasks.add_progress(task.id, 5_000).unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.time_completed_today_ms, 5_000);

        tasks.delete(task.id).unwrap();
        assert_eq!(stream.next().await.unwrap(), None);
    }
}
