use super::database::Database;
use crate::error::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};

/// The persisted "active day" contract over the shared [`Database`]
#[derive(Clone)]
pub struct DayStateStore {
    db: Arc<Database>,
}

impl DayStateStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Day the stored progress belongs to; `None` before the first day check
    pub fn active_day(&self) -> Option<NaiveDate> {
        self.db.snapshot().active_day
    }

    /// Stream of the active day, starting with the current value
    pub fn watch(&self) -> impl Stream<Item = Option<NaiveDate>> + Send + 'static {
        WatchStream::new(self.db.subscribe()).map(|s| s.active_day)
    }

    pub fn set_active_day(&self, day: NaiveDate) -> Result<()> {
        self.db.transaction(|s| {
            s.active_day = Some(day);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_active_day_round_trip() {
        let store = DayStateStore::new(Arc::new(Database::in_memory()));
        let mut stream = Box::pin(store.watch());
        assert_eq!(store.active_day(), None);
        assert_eq!(stream.next().await.unwrap(), None);

        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        store.set_active_day(day).unwrap();
        assert_eq!(store.active_day(), Some(day));
        assert_eq!(stream.next().await.unwrap(), Some(day));
    }
}
