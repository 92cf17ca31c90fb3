//! Cross-process gate lock.
//!
//! Two daemons starting at the same moment must not both decide they are
//! alone. Instance arbitration therefore runs while holding an exclusive
//! advisory lock on a gate file next to the instance records. The kernel drops
//! the lock if the holder dies, so a crash never leaves the gate closed.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::common::constants::INSTANCE_GATE_NAME;

/// Held exclusive lock on the gate file; released on drop.
pub struct GateLock {
    file: File,
}

impl GateLock {
    /// Block until the gate in `dir` is acquired, creating `dir` if needed.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let file = open_gate(dir)?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock gate file in {}", dir.display()))?;

        Ok(Self { file })
    }

    /// Acquire the gate without blocking; `Ok(None)` if someone else holds it.
    #[cfg(test)]
    fn try_acquire(dir: &Path) -> Result<Option<Self>> {
        let file = open_gate(dir)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(_) => Ok(None),
        }
    }
}

fn open_gate(dir: &Path) -> Result<File> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create instance directory {}", dir.display()))?;

    let path = dir.join(INSTANCE_GATE_NAME);
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("Failed to open gate file {}", path.display()))
}

impl Drop for GateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_gate_is_exclusive_until_dropped() {
        let dir = tempdir().unwrap();

        let held = GateLock::acquire(dir.path()).unwrap();
        assert!(GateLock::try_acquire(dir.path()).unwrap().is_none());

        drop(held);
        assert!(GateLock::try_acquire(dir.path()).unwrap().is_some());
    }

    #[test]
    fn test_gate_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        let _gate = GateLock::acquire(&nested).unwrap();
        assert!(nested.join(INSTANCE_GATE_NAME).exists());
    }
}
