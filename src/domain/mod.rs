pub mod enums;
pub mod statistic;
pub mod task;

pub use enums::TimerStatus;
pub use statistic::TaskStatistic;
pub use task::{
    format_clock, format_duration, validate_task, NewTask, Task, TaskId, TaskUpdate, Weekdays,
    MS_PER_MINUTE,
};
