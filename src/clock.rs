use chrono::{Days, Local, NaiveDate};
use std::sync::Mutex;

/// Source of the current calendar day
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Device calendar in the local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock whose day only changes when told to
#[derive(Debug)]
pub struct ManualClock {
    today: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn set(&self, day: NaiveDate) {
        *self.today.lock().unwrap_or_else(|p| p.into_inner()) = day;
    }

    /// Move forward by `days`; saturates at the end of the calendar
    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap_or_else(|p| p.into_inner());
        *today = today.checked_add_days(Days::new(days)).unwrap_or(*today);
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(|p| p.into_inner())
    }
}
