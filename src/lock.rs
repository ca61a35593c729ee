use crate::config::Config;
use crate::error::{HbError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Exclusive advisory lock held while a command mutates the store.
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub fn acquire() -> Result<Self> {
        Self::acquire_at(&Config::lock_path())
    }

    pub fn acquire_at(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.lock_exclusive()
            .map_err(|e| HbError::Lock(format!("failed to acquire lock: {}", e)))?;
        tracing::debug!(path = %path.display(), "store lock acquired");

        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
