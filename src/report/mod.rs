pub mod generator;
pub mod stats;

pub use generator::{day_statistics, generate_report, render_report};
pub use stats::{summarize_days, task_history, DaySummary, TaskHistory};
