use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
    time::Duration,
};

use crate::storage::StorageBackend;

/// Lower bound for every interval/timeout so a typo cannot spin the CPU.
const MIN_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    /// Time between two probes of the foreground window.
    pub poll_interval_ms: u64,
    /// Sessions must be strictly longer than this to be stored.
    pub min_session_ms: u64,
    /// Budget for each probe strategy in the fallback chain.
    pub probe_timeout_ms: u64,
    /// Budget for a whole tick, all strategies included.
    pub tick_timeout_ms: u64,
    pub storage_backend: StorageBackend,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            min_session_ms: 3000,
            probe_timeout_ms: 3000,
            tick_timeout_ms: 10_000,
            storage_backend: StorageBackend::Json,
        }
    }
}

impl TrackerSettings {
    pub fn validated(mut self) -> Self {
        self.poll_interval_ms = self.poll_interval_ms.max(MIN_INTERVAL_MS);
        self.probe_timeout_ms = self.probe_timeout_ms.max(MIN_INTERVAL_MS);
        self.tick_timeout_ms = self.tick_timeout_ms.max(self.probe_timeout_ms);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_millis(self.tick_timeout_ms)
    }
}

/// `settings.json` in the data directory, cached behind a lock.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<TrackerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<TrackerSettings>(&contents)
                .unwrap_or_else(|err| {
                    log::warn!(
                        "Ignoring unparsable settings in {} ({err}); using defaults",
                        path.display()
                    );
                    TrackerSettings::default()
                })
                .validated()
        } else {
            TrackerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tracker(&self) -> TrackerSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_tracker(&self, settings: TrackerSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = settings.validated();
        self.persist(&guard)
    }

    fn persist(&self, data: &TrackerSettings) -> Result<()> {
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

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.tracker(), TrackerSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"minSessionMs": 0, "storageBackend": "sqlite"}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().tracker();
        assert_eq!(settings.min_session_ms, 0);
        assert_eq!(settings.storage_backend, StorageBackend::Sqlite);
        assert_eq!(settings.poll_interval_ms, 2000);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ nope").unwrap();

        assert_eq!(
            SettingsStore::new(path).unwrap().tracker(),
            TrackerSettings::default()
        );
    }

    #[test]
    fn updates_are_clamped_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        store
            .update_tracker(TrackerSettings {
                poll_interval_ms: 5,
                probe_timeout_ms: 4000,
                tick_timeout_ms: 1000,
                ..TrackerSettings::default()
            })
            .unwrap();

        let reopened = SettingsStore::new(path).unwrap().tracker();
        assert_eq!(reopened.poll_interval_ms, MIN_INTERVAL_MS);
        assert_eq!(reopened.tick_timeout_ms, 4000);
        assert_eq!(reopened, store.tracker());
    }
}
