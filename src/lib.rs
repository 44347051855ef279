//! Daily task timer: countdown against per-task daily goals, with
//! per-day statistics captured when the calendar day rolls over.

pub mod app;
pub mod clock;
pub mod config;
pub mod day_checker;
pub mod domain;
pub mod error;
pub mod notifications;
pub mod persistence;
pub mod report;
pub mod timer;

pub use app::{App, Background, StopReason};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use day_checker::{DayChecker, DayEvent, RolloverReport};
pub use error::{Error, Result};
pub use timer::{TaskTimer, TimerEvent, TimerProgress, TimerSettings};
