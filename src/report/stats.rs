use crate::domain::{TaskId, TaskStatistic};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Totals for one recorded day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySummary {
    pub day: NaiveDate,
    pub tasks: usize,
    pub completed_tasks: usize,
    pub goal_ms: u64,
    pub completed_ms: u64,
    /// Completed time with each task capped at its goal
    pub credited_ms: u64,
}

impl DaySummary {
    fn new(day: NaiveDate) -> Self {
        Self {
            day,
            tasks: 0,
            completed_tasks: 0,
            goal_ms: 0,
            completed_ms: 0,
            credited_ms: 0,
        }
    }

    fn add(&mut self, statistic: &TaskStatistic) {
        self.tasks += 1;
        if statistic.is_completed() {
            self.completed_tasks += 1;
        }
        self.goal_ms += statistic.goal_ms();
        self.completed_ms += statistic.completed_ms;
        self.credited_ms += statistic.completed_ms.min(statistic.goal_ms());
    }

    /// Share of the day's goals met, 0-100; overtime on one task doesn't cover another
    pub fn completion_percent(&self) -> f64 {
        if self.goal_ms == 0 {
            return 0.0;
        }
        (self.credited_ms as f64 / self.goal_ms as f64) * 100.0
    }
}

/// One summary per recorded day, newest first
pub fn summarize_days(statistics: &[TaskStatistic]) -> Vec<DaySummary> {
    let mut days: BTreeMap<NaiveDate, DaySummary> = BTreeMap::new();
    for statistic in statistics {
        days.entry(statistic.day)
            .or_insert_with(|| DaySummary::new(statistic.day))
            .add(statistic);
    }
    days.into_values().rev().collect()
}

/// Long-run figures for a single task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskHistory {
    pub task_id: TaskId,
    pub days_tracked: usize,
    pub days_completed: usize,
    pub total_ms: u64,
    /// Completed days in a row, ending at the latest recorded day
    pub current_streak: usize,
    pub best_streak: usize,
}

/// Aggregate a task's statistics.
///
/// A streak is a run of consecutive calendar days that all met the goal.
/// A missing day or an unmet goal ends it.
pub fn task_history(task_id: TaskId, statistics: &[TaskStatistic]) -> TaskHistory {
    let mut own: Vec<&TaskStatistic> = statistics
        .iter()
        .filter(|s| s.task_id == task_id)
        .collect();
    own.sort_by_key(|s| s.day);

    let mut history = TaskHistory {
        task_id,
        ..TaskHistory::default()
    };
    let mut streak = 0;
    let mut previous: Option<NaiveDate> = None;

    for statistic in own {
        history.days_tracked += 1;
        history.total_ms += statistic.completed_ms;

        if statistic.is_completed() {
            history.days_completed += 1;
            let continues = previous
                .and_then(|p| p.succ_opt())
                .is_some_and(|next| next == statistic.day);
            streak = if continues { streak + 1 } else { 1 };
            history.best_streak = history.best_streak.max(streak);
            previous = Some(statistic.day);
        } else {
            streak = 0;
            previous = None;
        }
    }

    history.current_streak = streak;
    history
}
