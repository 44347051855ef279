use super::database::{Database, Snapshot};
use crate::domain::{TaskId, TaskStatistic};
use crate::error::Result;
use std::cmp::Reverse;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};

/// Per-day statistics contract over the shared [`Database`]
#[derive(Clone)]
pub struct StatisticsStore {
    db: Arc<Database>,
}

impl StatisticsStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a statistic, replacing an existing row for the same (task, day)
    pub fn insert_or_replace(&self, statistic: TaskStatistic) -> Result<()> {
        self.db.transaction(|s| {
            s.insert_statistic(statistic);
            Ok(())
        })
    }

    /// All statistics, newest day first
    pub fn all(&self) -> Vec<TaskStatistic> {
        newest_first(&self.db.snapshot(), None)
    }

    /// Statistics of one task, newest day first
    pub fn for_task(&self, task_id: TaskId) -> Vec<TaskStatistic> {
        newest_first(&self.db.snapshot(), Some(task_id))
    }

    pub fn watch_all(&self) -> impl Stream<Item = Vec<TaskStatistic>> + Send + 'static {
        WatchStream::new(self.db.subscribe()).map(|s| newest_first(&s, None))
    }

    pub fn watch_task(&self, task_id: TaskId) -> impl Stream<Item = Vec<TaskStatistic>> + Send + 'static {
        WatchStream::new(self.db.subscribe()).map(move |s| newest_first(&s, Some(task_id)))
    }
}

fn newest_first(snapshot: &Snapshot, task_id: Option<TaskId>) -> Vec<TaskStatistic> {
    let mut stats: Vec<TaskStatistic> = snapshot
        .statistics
        .values()
        .filter(|s| task_id.map_or(true, |id| s.task_id == id))
        .cloned()
        .collect();
    stats.sort_by_key(|s| (Reverse(s.day), s.task_id));
    stats
}
