//! Compositor socket readiness thread.
//!
//! Reads Wayland events off the socket into the event queue and wakes the
//! coordinator, which dispatches them on its own thread. A timerfd is polled
//! next to the socket so shutdown can unblock the wait without touching the
//! Wayland connection.

use anyhow::{Context, Result, bail};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use std::io::ErrorKind;
use std::os::fd::AsFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wayland_backend::client::WaylandError;
use wayland_client::Connection;

use crate::common::constants::{LOOP_WAIT_MS, SHUTDOWN_UNBLOCK_MS};
use crate::core::shared::Shared;

/// Running poller thread.
pub struct Poller {
    timer: Arc<TimerFd>,
    thread: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn spawn(connection: Connection, shared: Arc<Shared>) -> Result<Self> {
        let timer = Arc::new(
            TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::TFD_CLOEXEC)
                .context("Failed to create shutdown timer")?,
        );

        let thread = {
            let timer = timer.clone();
            thread::Builder::new()
                .name("wayland-poll".into())
                .spawn(move || {
                    if let Err(e) = run(&connection, &timer, &shared) {
                        log_critical!("{:#}", e);
                        shared.request_terminate();
                    }
                })
                .context("Failed to spawn Wayland poll thread")?
        };

        Ok(Self {
            timer,
            thread: Some(thread),
        })
    }

    /// Unblock the poll wait and join the thread. Termination must already
    /// have been requested on the shared state.
    pub fn shutdown(mut self) {
        let unblock = TimeSpec::from_duration(Duration::from_millis(SHUTDOWN_UNBLOCK_MS));
        if let Err(e) = self
            .timer
            .set(Expiration::OneShot(unblock), TimerSetTimeFlags::empty())
        {
            log_warning!("Failed to arm shutdown timer: {}", e);
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(connection: &Connection, timer: &TimerFd, shared: &Shared) -> Result<()> {
    loop {
        if shared.is_terminating() {
            return Ok(());
        }

        // Events already queued: let the coordinator dispatch them first
        let Some(guard) = connection.prepare_read() else {
            shared.signal_readable();
            thread::sleep(Duration::from_millis(1));
            continue;
        };

        if let Err(e) = connection.flush() {
            log_debug!("Wayland flush before poll failed: {}", e);
        }

        let (socket_ready, timer_ready) = {
            let mut fds = [
                PollFd::new(guard.connection_fd(), PollFlags::POLLIN),
                PollFd::new(timer.as_fd(), PollFlags::POLLIN),
            ];

            match poll(&mut fds, PollTimeout::from(LOOP_WAIT_MS as u16)) {
                Ok(_) => {}
                // Dropping the guard cancels the read
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e).context("Polling the Wayland socket failed"),
            }

            for (i, fd) in fds.iter().enumerate() {
                if fd.revents().is_some_and(|r| r.contains(PollFlags::POLLHUP)) {
                    bail!("Disconnected from poll descriptor {i}");
                }
            }

            let readable = |fd: &PollFd| fd.revents().is_some_and(|r| r.contains(PollFlags::POLLIN));
            (readable(&fds[0]), readable(&fds[1]))
        };

        if timer_ready {
            // Armed only during shutdown
            return Ok(());
        }

        if socket_ready {
            match guard.read() {
                Ok(_) => {}
                // Another reader took the events first
                Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(e).context("Reading Wayland events failed"),
            }
            shared.signal_readable();
        }
    }
}
