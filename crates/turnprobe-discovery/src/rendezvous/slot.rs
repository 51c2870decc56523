//! Shared single-value slots.

use super::error::CoordinatorError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// A durable named value store visible to both probe processes.
///
/// A write must be visible to any later read, including from another process.
#[async_trait]
pub trait AddressSlot: Send + Sync {
    /// Replace the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Unavailable`] if the store cannot be written.
    async fn write(&self, key: &str, value: &str) -> Result<(), CoordinatorError>;

    /// Read the value under `key`, `None` if nothing was written yet
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Unavailable`] if the store cannot be read.
    async fn read(&self, key: &str) -> Result<Option<String>, CoordinatorError>;
}

/// One file per key under a shared directory.
///
/// Values are written to a temporary sibling and renamed into place, so a
/// concurrent reader sees either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileSlot {
    dir: PathBuf,
}

impl FileSlot {
    /// Slot rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the key files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`
    #[must_use]
    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl AddressSlot for FileSlot {
    async fn write(&self, key: &str, value: &str) -> Result<(), CoordinatorError> {
        let path = self.path(key);
        let tmp = self.dir.join(format!(".{key}.tmp"));

        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| CoordinatorError::unavailable(key, format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CoordinatorError::unavailable(key, format!("{}: {e}", path.display())))?;

        tracing::trace!("Wrote {} to {}", value, path.display());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>, CoordinatorError> {
        let path = self.path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let value = contents.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoordinatorError::unavailable(
                key,
                format!("{}: {e}", path.display()),
            )),
        }
    }
}

/// In-process slot. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct MemorySlot {
    values: Arc<Mutex<HashMap<String, String>>>,
    available: Arc<AtomicBool>,
}

impl Default for MemorySlot {
    fn default() -> Self {
        Self {
            values: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl MemorySlot {
    /// Create an empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read and write fail with `Unavailable` until re-enabled
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self, key: &str) -> Result<(), CoordinatorError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoordinatorError::unavailable(key, "slot offline"))
        }
    }
}

#[async_trait]
impl AddressSlot for MemorySlot {
    async fn write(&self, key: &str, value: &str) -> Result<(), CoordinatorError> {
        self.check(key)?;
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>, CoordinatorError> {
        self.check(key)?;
        Ok(self.values.lock().await.get(key).cloned())
    }
}
