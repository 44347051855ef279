use super::files::{atomic_write, read_file};
use crate::domain::TaskId;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Per-user choices stored in preferences.json
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Task the timer was last pointed at (running state is not persisted)
    #[serde(default)]
    pub selected_task_id: Option<TaskId>,
}

/// Load preferences from a file; a missing file yields defaults
pub fn load_preferences<P: AsRef<Path>>(path: P) -> Result<Preferences> {
    let content = read_file(path)?;
    if content.trim().is_empty() {
        return Ok(Preferences::default());
    }
    let preferences: Preferences = serde_json::from_str(&content)?;
    Ok(preferences)
}

/// Save preferences to a file
pub fn save_preferences<P: AsRef<Path>>(path: P, preferences: &Preferences) -> Result<()> {
    let json = serde_json::to_string_pretty(preferences)?;
    atomic_write(path, &json)?;
    Ok(())
}

/// Cached preferences with write-through to disk
pub struct PreferencesStore {
    path: Option<PathBuf>,
    current: Mutex<Preferences>,
}

impl PreferencesStore {
    /// Load from `path`, falling back to defaults when the file is unreadable
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let current = load_preferences(&path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "could not read preferences, using defaults");
            Preferences::default()
        });
        Self {
            path: Some(path),
            current: Mutex::new(current),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: Mutex::new(Preferences::default()),
        }
    }

    pub fn selected_task(&self) -> Option<TaskId> {
        self.lock().selected_task_id
    }

    pub fn set_selected_task(&self, task_id: Option<TaskId>) -> Result<()> {
        let mut current = self.lock();
        if current.selected_task_id == task_id {
            return Ok(());
        }
        current.selected_task_id = task_id;
        if let Some(path) = &self.path {
            save_preferences(path, &current)?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Preferences> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_nonexistent_preferences() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("preferences.json");

        let preferences = load_preferences(&path).unwrap();
        assert_eq!(preferences, Preferences::default());
    }

    #[test]
    fn test_save_and_load_preferences() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("preferences.json");

        let preferences = Preferences {
            selected_task_id: Some(3),
        };
        save_preferences(&path, &preferences).unwrap();

        let loaded = load_preferences(&path).unwrap();
        assert_eq!(loaded.selected_task_id, Some(3));
    }

    #[test]
    fn test_store_writes_through() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("preferences.json");

        let store = PreferencesStore::open(&path);
        assert_eq!(store.selected_task(), None);
        store.set_selected_task(Some(5)).unwrap();

        let reopened = PreferencesStore::open(&path);
        assert_eq!(reopened.selected_task(), Some(5));
    }

    #[test]
    fn test_store_falls_back_on_garbage() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("preferences.json");
        atomic_write(&path, "selected = 5").unwrap();

        let store = PreferencesStore::open(&path);
        assert_eq!(store.selected_task(), None);
    }
}
