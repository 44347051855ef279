pub mod database;
pub mod day_state;
pub mod files;
pub mod preferences;
pub mod statistics;
pub mod tasks;

pub use database::{Database, Snapshot};
pub use day_state::DayStateStore;
pub use files::{
    atomic_write, backup_file, config_file, database_file, ensure_data_dir, get_data_dir,
    init_local_data_dir, preferences_file, read_file, report_file,
};
pub use preferences::{load_preferences, save_preferences, Preferences, PreferencesStore};
pub use statistics::StatisticsStore;
pub use tasks::TaskStore;
