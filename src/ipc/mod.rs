//! Unix socket interfaces: the request/reply control channel and the
//! broadcast event channel.

pub mod command;
pub mod control;
pub mod events;

pub use command::{CommandOutcome, execute};
pub use control::ControlChannel;
pub use events::{EventChannel, EventHub, EventNotifier, Notice};

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::net::UnixListener;
use std::path::Path;

/// Bind a non-blocking listener at `path`, replacing a leftover socket file.
fn bind_listener(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory {}", parent.display()))?;
    }
    remove_socket(path);

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind socket {}", path.display()))?;
    listener
        .set_nonblocking(true)
        .context("Failed to make socket non-blocking")?;
    Ok(listener)
}

fn remove_socket(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log_warning!("Failed to remove socket {}: {}", path.display(), e);
    }
}
