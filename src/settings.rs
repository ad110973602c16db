use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use crate::images::UploadLimits;

pub const REMOTE_URL_ENV: &str = "LECTURE_NOTES_REMOTE_URL";
pub const DEBUG_ENV: &str = "LECTURE_NOTES_DEBUG";

/// Debounce windows for the two save tiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncSettings {
    /// Quiet period after the last edit before writing to the local cache.
    pub autosave_delay_ms: u64,
    /// Quiet period after the last local save before mirroring to the server.
    pub remote_sync_delay_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            autosave_delay_ms: 500,
            remote_sync_delay_ms: 2000,
        }
    }
}

impl SyncSettings {
    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    pub fn remote_sync_delay(&self) -> Duration {
        Duration::from_millis(self.remote_sync_delay_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotesSettings {
    pub sync: SyncSettings,
    pub upload: UploadLimits,
    pub remote_base_url: Option<String>,
    pub cache_path: Option<PathBuf>,
}

impl NotesSettings {
    /// Environment wins over the file for the remote url.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(REMOTE_URL_ENV) {
            let url = url.trim();
            self.remote_base_url = (!url.is_empty()).then(|| url.to_string());
        }
        self
    }
}

pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<NotesSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings in {}: {err}", path.display());
                NotesSettings::default()
            })
        } else {
            NotesSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Current settings with environment overrides applied.
    pub fn settings(&self) -> NotesSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .with_env_overrides()
    }

    pub fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut NotesSettings),
    {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        change(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &NotesSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let data = store.data.read().unwrap().clone();
        assert_eq!(data, NotesSettings::default());
        assert_eq!(data.sync.autosave_delay(), Duration::from_millis(500));
        assert_eq!(data.sync.remote_sync_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "sync": { "autosave_delay_ms": 250 } }"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let data = store.data.read().unwrap().clone();
        assert_eq!(data.sync.autosave_delay_ms, 250);
        assert_eq!(data.sync.remote_sync_delay_ms, 2000);
        assert_eq!(data.upload, UploadLimits::default());
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(*store.data.read().unwrap(), NotesSettings::default());
    }

    #[test]
    fn updates_are_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        store
            .update(|settings| settings.upload.max_bytes = 1024)
            .unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.data.read().unwrap().upload.max_bytes, 1024);
    }
}
