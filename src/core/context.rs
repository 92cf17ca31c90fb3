//! Lifecycle and reload bookkeeping for the coordinator.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Reload requests arriving closer together than this are coalesced.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// Daemon lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    /// Connected, waiting for the compositor to announce its globals.
    AwaitingProtocolHandshake,
    Running,
    Terminating,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Starting => "starting",
            Phase::AwaitingProtocolHandshake => "awaiting protocol handshake",
            Phase::Running => "running",
            Phase::Terminating => "terminating",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Tracks where the daemon is in its lifecycle and where its config lives.
#[derive(Debug)]
pub struct Context {
    phase: Phase,
    /// Explicit `--config` path; `None` means the default location.
    config_path: Option<PathBuf>,
    last_config_reload: Option<Instant>,
}

impl Context {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        log_debug!("Lifecycle: {}", Phase::Starting);
        Self {
            phase: Phase::Starting,
            config_path,
            last_config_reload: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to `phase`. Transitions never go backwards.
    pub fn enter(&mut self, phase: Phase) {
        if phase as u8 <= self.phase as u8 {
            return;
        }
        log_debug!("Lifecycle: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Record a reload attempt. Returns `false` if one just happened.
    pub fn begin_config_reload(&mut self) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_config_reload
            && now.duration_since(last) < RELOAD_DEBOUNCE
        {
            return false;
        }
        self.last_config_reload = Some(now);
        true
    }
}
