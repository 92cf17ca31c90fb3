//! The coordinator: the only thread that talks to the compositor.
//!
//! Background threads (poller, scheduler, control channel, signals) never touch
//! the display. They set flags on [`shared::Shared`] and wake the coordinator,
//! which on each iteration:
//!
//! - dispatches compositor events the poller has read,
//! - reloads the configuration if asked to,
//! - pushes the matrix if the scheduler switched profiles, or else
//! - executes one pending control request, pushing first if it changed the
//!   color state and only then replying.
//!
//! Every color change is announced on the event channel.

pub mod context;
pub mod poller;
pub mod scheduler;
pub mod shared;

use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{self, DisplaySync};
use crate::color::{ColorSettings, Matrix3};
use crate::common::constants::LOOP_WAIT_MS;
use crate::config::Config;
use crate::ipc::{EventNotifier, Notice, command};

pub use context::{Context, Phase};
use shared::{ProfileSource, Shared};

/// Everything the coordinator needs, bundled to keep the constructor small.
pub struct CoordinatorParams {
    pub display: Box<dyn DisplaySync>,
    pub shared: Arc<Shared>,
    /// `None` when the event channel could not be bound.
    pub notifier: Option<EventNotifier>,
    pub context: Context,
}

pub struct Coordinator {
    display: Box<dyn DisplaySync>,
    shared: Arc<Shared>,
    notifier: Option<EventNotifier>,
    context: Context,
    /// Settings last announced to event subscribers.
    announced: ColorSettings,
}

impl Coordinator {
    pub fn new(params: CoordinatorParams) -> Self {
        let announced = params.shared.lock().color.settings();
        Self {
            display: params.display,
            shared: params.shared,
            notifier: params.notifier,
            context: params.context,
            announced,
        }
    }

    pub fn phase(&self) -> Phase {
        self.context.phase()
    }

    /// Push the current matrix to every output.
    pub fn apply_current(&mut self) {
        let matrix = {
            let mut state = self.shared.lock();
            state.reload_due = false;
            *state.color.matrix()
        };
        self.push(&matrix);
    }

    /// Run until termination is requested or the compositor connection fails.
    pub fn run(&mut self) -> Result<()> {
        self.context.enter(Phase::Running);

        let result = loop {
            match self.step() {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => {
                    self.shared.request_terminate();
                    break Err(e);
                }
            }
        };

        self.context.enter(Phase::Terminating);
        self.send(Notice::new("shutdown", ""));
        result
    }

    /// One loop iteration. Returns `false` once the daemon is terminating.
    pub fn step(&mut self) -> Result<bool> {
        let (dispatch, reload_config) = {
            let mut state = self
                .shared
                .wait_for_work(Duration::from_millis(LOOP_WAIT_MS));
            if state.terminate {
                return Ok(false);
            }
            (
                std::mem::take(&mut state.should_process),
                std::mem::take(&mut state.config_reload),
            )
        };

        if dispatch {
            // Protocol failures here are fatal
            self.display.dispatch_pending()?;
        }

        if reload_config {
            self.reload_config();
        }

        let mut state = self.shared.lock();
        if state.reload_due {
            state.reload_due = false;
            let matrix = *state.color.matrix();
            let settings = state.color.settings();
            let switched = state.switched_to.take();
            drop(state);

            self.push(&matrix);
            if let Some(at) = switched {
                self.send(Notice::new("profile", at.format("%H:%M").to_string()));
            }
            self.announce(settings);
        } else if let Some(request) = state.pending_request.take() {
            let outcome = command::execute(&mut state.color, &request);
            let matrix = *state.color.matrix();
            let settings = state.color.settings();
            drop(state);

            if outcome.mutated {
                self.push(&matrix);
                self.announce(settings);
            }
            log_debug!("Control reply: '{}'", outcome.reply);
            self.shared.post_reply(outcome.reply);
        }

        Ok(true)
    }

    /// Tear down: the display connection is released here, resetting outputs.
    pub fn finish(mut self) {
        self.context.enter(Phase::Stopped);
        drop(self.display);
    }

    fn push(&mut self, matrix: &Matrix3) {
        if let Err(e) = backend::push_to_all(self.display.as_mut(), matrix) {
            log_error!("Failed to apply CTM: {:#}", e);
        }
    }

    fn send(&self, notice: Notice) {
        if let Some(notifier) = &self.notifier {
            notifier.send(notice);
        }
    }

    fn announce(&mut self, settings: ColorSettings) {
        for notice in Notice::for_change(&self.announced, &settings) {
            self.send(notice);
        }
        self.announced = settings;
    }

    /// Re-read the configuration and rebuild the timetable.
    ///
    /// A file that fails to load leaves the running schedule untouched. The
    /// gamma ceiling is fixed for the lifetime of the process.
    fn reload_config(&mut self) {
        if !self.context.begin_config_reload() {
            log_debug!("Ignoring duplicate reload request");
            return;
        }

        let config = match Config::load(self.context.config_path()) {
            Ok(config) => config,
            Err(e) => {
                log_error!("Configuration reload failed, keeping current profiles: {:#}", e);
                return;
            }
        };

        let source = ProfileSource {
            profiles: config.profiles(),
            location: config.location(),
        };
        let timetable = source.resolve(Local::now().date_naive());
        log_block_start!("Configuration reloaded");
        timetable.log_summary();

        let generation = {
            let mut state = self.shared.lock();
            state.source = Arc::new(source);
            scheduler::install_timetable(&mut state, timetable);
            state.generation
        };
        // Wake the scheduler so it sleeps towards the new timetable
        self.shared.notify();
        self.send(Notice::new("reload", generation.to_string()));
    }
}
