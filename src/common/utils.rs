//! Runtime path resolution, session detection and process liveness probing.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::{Pid, getuid};
use std::path::{Path, PathBuf};

use crate::common::constants::*;

/// Per-user runtime directory used for sockets and instance records.
///
/// Resolves to `$XDG_RUNTIME_DIR/hypr`, falling back to `/run/user/<uid>/hypr`
/// when the variable is unset.
pub fn runtime_dir() -> PathBuf {
    let base = std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(format!("/run/user/{}", getuid())));
    base.join("hypr")
}

/// Filesystem locations of everything the daemon creates at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimePaths {
    pub control_socket: PathBuf,
    pub event_socket: PathBuf,
    pub instance_dir: PathBuf,
}

impl RuntimePaths {
    /// Derive paths from the process environment.
    pub fn from_env() -> Self {
        let signature = std::env::var("HYPRLAND_INSTANCE_SIGNATURE").ok();
        Self::new(&runtime_dir(), signature.as_deref())
    }

    /// Derive paths below `runtime`, scoping the sockets to the compositor
    /// instance `signature` when one is known.
    pub fn new(runtime: &Path, signature: Option<&str>) -> Self {
        let socket_dir = match signature {
            Some(sig) if !sig.is_empty() => runtime.join(sig),
            _ => runtime.to_path_buf(),
        };

        Self {
            control_socket: socket_dir.join(CONTROL_SOCKET_NAME),
            event_socket: socket_dir.join(EVENT_SOCKET_NAME),
            instance_dir: runtime.join(INSTANCE_DIR_NAME),
        }
    }
}

/// Identifier of the compositor session this daemon serves.
///
/// Two daemons with the same identifier would fight over the same outputs, so
/// the instance arbiter only ever evicts records carrying the same value.
pub fn session_id() -> Result<String> {
    let display = std::env::var("WAYLAND_DISPLAY")
        .context("WAYLAND_DISPLAY is not set. Are you running on Wayland?")?;
    if display.is_empty() {
        anyhow::bail!("WAYLAND_DISPLAY is empty");
    }
    Ok(display)
}

/// Check whether a process with the given PID still exists.
///
/// Uses a null signal: success or `EPERM` both mean the PID is taken.
pub fn is_process_alive(pid: u32) -> bool {
    // 0 and negative values address process groups, not a process
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_scoped_to_instance_signature() {
        let paths = RuntimePaths::new(Path::new("/run/user/1000/hypr"), Some("abc_123"));
        assert_eq!(
            paths.control_socket,
            PathBuf::from("/run/user/1000/hypr/abc_123/.hyprsunset.sock")
        );
        assert_eq!(
            paths.event_socket,
            PathBuf::from("/run/user/1000/hypr/abc_123/.hyprsunset2.sock")
        );
        assert_eq!(
            paths.instance_dir,
            PathBuf::from("/run/user/1000/hypr/hyprsunset")
        );
    }

    #[test]
    fn test_paths_without_signature() {
        let paths = RuntimePaths::new(Path::new("/tmp/rt/hypr"), None);
        assert_eq!(
            paths.control_socket,
            PathBuf::from("/tmp/rt/hypr/.hyprsunset.sock")
        );

        let empty = RuntimePaths::new(Path::new("/tmp/rt/hypr"), Some(""));
        assert_eq!(empty, paths);
    }

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_out_of_range_pid_is_dead() {
        assert!(!is_process_alive(u32::MAX));
    }

    #[test]
    fn test_pid_zero_is_not_a_process() {
        assert!(!is_process_alive(0));
    }
}
