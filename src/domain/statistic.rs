use super::task::{Task, TaskId, MS_PER_MINUTE};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Frozen snapshot of one task's goal and progress on one day.
///
/// Keyed by `(task_id, day)`; the statistics store keeps at most one row per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatistic {
    pub task_id: TaskId,
    pub day: NaiveDate,
    pub goal_minutes: u32,
    pub completed_ms: u64,
}

impl TaskStatistic {
    /// Snapshot a task's current figures for `day`
    pub fn capture(task: &Task, day: NaiveDate) -> Self {
        Self {
            task_id: task.id,
            day,
            goal_minutes: task.daily_goal_minutes,
            completed_ms: task.time_completed_today_ms,
        }
    }

    pub fn key(&self) -> (TaskId, NaiveDate) {
        (self.task_id, self.day)
    }

    pub fn goal_ms(&self) -> u64 {
        u64::from(self.goal_minutes) * MS_PER_MINUTE
    }

    pub fn is_completed(&self) -> bool {
        self.completed_ms >= self.goal_ms()
    }
}
