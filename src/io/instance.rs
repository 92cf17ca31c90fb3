//! Single-instance arbitration per compositor session.
//!
//! Every running daemon keeps a record file named after its PID in the
//! instance directory:
//!
//! ```text
//! <pid>
//! <session id>
//! ```
//!
//! On startup, under the [`GateLock`], the directory is scanned. A live
//! instance serving the same session is asked to terminate and waited for.
//! Records of dead processes are removed. Instances of other sessions are
//! left alone. Then this process writes its own record, which the returned
//! [`InstanceGuard`] removes again on drop.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::common::constants::EVICTION_POLL_MS;
use crate::common::utils::is_process_alive;
use crate::io::lock::GateLock;

/// Persisted description of a running daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub pid: u32,
    pub session_id: String,
}

impl InstanceRecord {
    /// Parse a record file: PID on the first line, session id on the second.
    pub fn from_contents(contents: &str) -> Result<Self> {
        let mut lines = contents.lines();

        let pid = lines
            .next()
            .context("Instance record is empty")?
            .trim()
            .parse::<u32>()
            .context("Invalid PID in instance record")?;
        if pid == 0 {
            anyhow::bail!("Instance record names PID 0");
        }

        let session_id = lines
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .context("Instance record has no session id")?
            .to_string();

        Ok(Self { pid, session_id })
    }

    pub fn to_contents(&self) -> String {
        format!("{}\n{}\n", self.pid, self.session_id)
    }
}

/// Decides whether this process may run, evicting a same-session predecessor.
pub struct InstanceArbiter {
    dir: PathBuf,
    record: InstanceRecord,
    eviction_timeout: Option<Duration>,
}

impl InstanceArbiter {
    pub fn new(dir: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            record: InstanceRecord {
                pid: std::process::id(),
                session_id: session_id.into(),
            },
            eviction_timeout: None,
        }
    }

    /// Give up waiting for an evicted instance after `timeout`.
    ///
    /// Without a timeout the arbiter waits as long as the old process lives.
    pub fn with_eviction_timeout(mut self, timeout: Duration) -> Self {
        self.eviction_timeout = Some(timeout);
        self
    }

    /// Scan existing records, evict a conflicting instance and register this one.
    pub fn acquire(self) -> Result<InstanceGuard> {
        let _gate = GateLock::acquire(&self.dir)?;

        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(file_pid) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            if file_pid == self.record.pid {
                // Left behind by an earlier process that had our PID
                remove_record(&path);
                continue;
            }

            self.examine(&path)?;
        }

        let own_path = self.dir.join(self.record.pid.to_string());
        fs::write(&own_path, self.record.to_contents())
            .with_context(|| format!("Failed to write instance record {}", own_path.display()))?;

        log_debug!("Registered instance record {}", own_path.display());

        Ok(InstanceGuard {
            path: own_path,
            pid: self.record.pid,
        })
    }

    fn examine(&self, path: &Path) -> Result<()> {
        let record = match fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|c| InstanceRecord::from_contents(&c))
        {
            Ok(record) => record,
            Err(e) => {
                log_warning!("Removing unreadable instance record {}: {}", path.display(), e);
                remove_record(path);
                return Ok(());
            }
        };

        if !is_process_alive(record.pid) {
            log_debug!("Removing stale instance record for PID {}", record.pid);
            remove_record(path);
            return Ok(());
        }

        if record.session_id != self.record.session_id {
            log_debug!(
                "Instance {} serves session '{}', leaving it running",
                record.pid,
                record.session_id
            );
            return Ok(());
        }

        log_block_start!(
            "Another instance (PID {}) is running on session '{}'",
            record.pid,
            record.session_id
        );
        self.evict(record.pid)?;
        remove_record(path);
        log_decorated!("Previous instance terminated");
        Ok(())
    }

    fn evict(&self, pid: u32) -> Result<()> {
        let raw = i32::try_from(pid).context("PID out of range")?;
        // Signalling PID 0 would hit our own process group
        if raw <= 0 {
            anyhow::bail!("Refusing to signal PID {pid}");
        }

        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(()),
            Err(e) => {
                anyhow::bail!("Failed to terminate previous instance (PID {pid}): {e}");
            }
        }

        let started = Instant::now();
        let mut last_notice = started;
        while is_process_alive(pid) {
            if let Some(timeout) = self.eviction_timeout
                && started.elapsed() >= timeout
            {
                anyhow::bail!(
                    "Previous instance (PID {pid}) did not exit within {}s",
                    timeout.as_secs()
                );
            }
            if last_notice.elapsed() >= Duration::from_secs(5) {
                log_indented!("Still waiting for PID {} to exit...", pid);
                last_notice = Instant::now();
            }
            std::thread::sleep(Duration::from_millis(EVICTION_POLL_MS));
        }

        Ok(())
    }
}

fn remove_record(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log_warning!("Failed to remove instance record {}: {}", path.display(), e);
    }
}

/// This process's registration; removes the record file on drop.
#[derive(Debug)]
pub struct InstanceGuard {
    path: PathBuf,
    pid: u32,
}

impl InstanceGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        // A successor may already have replaced the directory contents
        let ours = fs::read_to_string(&self.path)
            .ok()
            .and_then(|c| InstanceRecord::from_contents(&c).ok())
            .is_some_and(|r| r.pid == self.pid);
        if ours {
            remove_record(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_record_round_trip_format() {
        let record = InstanceRecord {
            pid: 4242,
            session_id: "wayland-1".into(),
        };
        assert_eq!(record.to_contents(), "4242\nwayland-1\n");
        assert_eq!(
            InstanceRecord::from_contents(&record.to_contents()).unwrap(),
            record
        );
    }

    #[test]
    fn test_record_parse_errors() {
        assert!(InstanceRecord::from_contents("").is_err());
        assert!(InstanceRecord::from_contents("abc\nwayland-1\n").is_err());
        assert!(InstanceRecord::from_contents("123\n").is_err());
        assert!(InstanceRecord::from_contents("123\n\n").is_err());
        assert!(InstanceRecord::from_contents("0\nwayland-1\n").is_err());
    }

    #[test]
    fn test_acquire_writes_and_guard_removes_record() {
        let dir = tempdir().unwrap();
        let guard = InstanceArbiter::new(dir.path(), "wayland-1")
            .acquire()
            .unwrap();

        let path = dir.path().join(std::process::id().to_string());
        assert_eq!(guard.path(), path);
        let record = InstanceRecord::from_contents(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(record.pid, std::process::id());
        assert_eq!(record.session_id, "wayland-1");

        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_and_garbage_records_are_removed() {
        let dir = tempdir().unwrap();
        // PIDs above the kernel maximum can never be alive
        let stale = dir.path().join("2147483600");
        fs::write(&stale, "2147483600\nwayland-1\n").unwrap();
        let garbage = dir.path().join("77");
        fs::write(&garbage, "not a record").unwrap();
        let unrelated = dir.path().join("notes.txt");
        fs::write(&unrelated, "keep me").unwrap();

        let _guard = InstanceArbiter::new(dir.path(), "wayland-1")
            .acquire()
            .unwrap();

        assert!(!stale.exists());
        assert!(!garbage.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_pid_zero_record_is_discarded_without_signalling() {
        let dir = tempdir().unwrap();
        let zero = dir.path().join("0");
        fs::write(&zero, "0\nwayland-1\n").unwrap();

        let guard = InstanceArbiter::new(dir.path(), "wayland-1")
            .acquire()
            .unwrap();

        // Still running, and the bogus record is gone
        assert!(!zero.exists());
        assert!(guard.path().exists());
    }
}
