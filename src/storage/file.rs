use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use anyhow::{anyhow, Context};
use chrono::Utc;

use super::{BlobStore, StoreError};

/// Single JSON file on disk, replaced through a sibling temp file + rename.
pub struct FileBlobStore {
    path: PathBuf,
}

impl FileBlobStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }
}

impl BlobStore for FileBlobStore {
    fn read_all(&self) -> Result<Option<Vec<u8>>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))
            .map(Some)
            .map_err(StoreError::ReadCorrupt)
    }

    fn write_all(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let write = || -> anyhow::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create data directory {}", parent.display())
                })?;
            }

            let temp_path = self.temp_path();
            fs::write(&temp_path, bytes)
                .with_context(|| format!("failed to write {}", temp_path.display()))?;
            fs::rename(&temp_path, &self.path).with_context(|| {
                format!(
                    "failed to move {} into place at {}",
                    temp_path.display(),
                    self.path.display()
                )
            })?;
            Ok(())
        };

        write().map_err(StoreError::WriteFailed)
    }

    /// Writes `<name>.corrupt-<unix ms>` next to the log.
    fn preserve(&self, bytes: &[u8]) -> Result<Option<String>, StoreError> {
        let backup = self.sibling(&format!(".corrupt-{}", Utc::now().timestamp_millis()));
        fs::write(&backup, bytes)
            .with_context(|| format!("failed to back up {}", self.path.display()))
            .map_err(StoreError::WriteFailed)?;
        Ok(Some(backup.display().to_string()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Process-local blob, for hosts that do not want anything on disk.
#[derive(Default)]
pub struct MemoryBlobStore {
    contents: Mutex<Option<Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: Mutex::new(Some(bytes.into())),
        }
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read_all(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.contents())
    }

    fn write_all(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let mut guard = self
            .contents
            .lock()
            .map_err(|_| StoreError::WriteFailed(anyhow!("memory blob lock poisoned")))?;
        *guard = Some(bytes.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
