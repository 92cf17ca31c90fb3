//! Request/reply control socket.
//!
//! Connections are handled strictly one after another: accept, read one
//! request, hand it to the coordinator, write the reply, close. The reply is
//! only produced once the coordinator has pushed any resulting color change,
//! so a client that reconnects right away observes the new state.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::common::constants::{CONTROL_REQUEST_MAX, IPC_POLL_MS};
use crate::core::shared::Shared;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// The bound control socket, before its thread is started.
pub struct ControlChannel {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlChannel {
    /// Bind the control socket at `path`, replacing a stale socket file.
    pub fn bind(path: &Path) -> Result<Self> {
        let listener = super::bind_listener(path)?;
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start the acceptor thread. It exits once `shared` starts terminating.
    pub fn spawn(self, shared: Arc<Shared>) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("control".into())
            .spawn(move || self.run(&shared))
            .context("Failed to spawn control channel thread")
    }

    fn run(self, shared: &Shared) {
        while !shared.is_terminating() {
            match self.wait_readable() {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    log_error!("Control channel stopped: {:#}", e);
                    break;
                }
            }

            match self.listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = handle_connection(stream, shared) {
                        log_debug!("Control connection failed: {:#}", e);
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                Err(e) => log_warning!("Failed to accept control connection: {}", e),
            }
        }

        log_debug!("Control channel closed");
        super::remove_socket(&self.path);
    }

    fn wait_readable(&self) -> Result<bool> {
        let mut fds = [PollFd::new(self.listener.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(IPC_POLL_MS)) {
            Ok(0) | Err(Errno::EINTR) => Ok(false),
            Ok(_) => Ok(fds[0]
                .revents()
                .is_some_and(|r| r.contains(PollFlags::POLLIN))),
            Err(e) => Err(e).context("poll on control socket failed"),
        }
    }
}

/// Serve one connection to completion.
fn handle_connection(mut stream: UnixStream, shared: &Shared) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    stream.set_write_timeout(Some(CLIENT_TIMEOUT))?;

    let mut buf = [0u8; CONTROL_REQUEST_MAX];
    let n = loop {
        match stream.read(&mut buf) {
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read control request"),
        }
    };

    let request = String::from_utf8_lossy(&buf[..n]).trim().to_string();
    log_debug!("Control request: '{}'", request);

    // None means the daemon is shutting down; close without a reply
    let Some(reply) = shared.submit_request(request) else {
        return Ok(());
    };

    stream
        .write_all(reply.as_bytes())
        .context("Failed to write control reply")?;
    Ok(())
}
