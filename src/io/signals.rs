//! Unix signal handling.
//!
//! A dedicated thread waits on `signal-hook`'s iterator and turns signals into
//! requests on the shared coordinator state:
//!
//! - `SIGINT`, `SIGTERM`, `SIGHUP`: begin shutdown
//! - `SIGUSR2`: reload the configuration and rebuild the schedule
//!
//! The thread only flips flags and notifies the condition variable; all real
//! work happens on the coordinator thread.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR2},
    iterator::{Handle, Signals},
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::core::shared::Shared;

/// Running signal thread. Dropping it without [`SignalHandler::close`] leaves
/// the thread parked until the process exits.
pub struct SignalHandler {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalHandler {
    /// Register handlers and spawn the signal thread.
    pub fn install(shared: Arc<Shared>) -> Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR2])
            .context("failed to register signal handlers")?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("signals".into())
            .spawn(move || {
                for sig in signals.forever() {
                    match sig {
                        SIGUSR2 => {
                            log_block_start!("Received SIGUSR2, reloading configuration");
                            shared.request_config_reload();
                        }
                        _ => {
                            let name = match sig {
                                SIGINT => "SIGINT",
                                SIGHUP => "SIGHUP",
                                _ => "SIGTERM",
                            };
                            log_block_start!("Received {}, shutting down", name);
                            shared.request_terminate();
                        }
                    }
                }
            })
            .context("Failed to spawn signal handler thread")?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Unregister and join the signal thread.
    pub fn close(mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
