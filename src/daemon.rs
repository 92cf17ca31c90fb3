//! Daemon lifecycle: startup, resource acquisition, the main loop and shutdown.
//!
//! Startup order matters. The instance arbiter runs before the compositor is
//! contacted, so an evicted predecessor has released the CTM manager by the
//! time this process binds it. The IPC channels are optional: if a socket
//! cannot be bound the daemon keeps running without it.

use anyhow::{Context as _, Result};
use chrono::Local;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::{
    args::RunOptions,
    backend::CtmBackend,
    color::{ColorSettings, ColorState},
    common::constants::*,
    common::utils::{RuntimePaths, session_id},
    config::Config,
    core::{
        Context, Coordinator, CoordinatorParams, Phase, poller::Poller, scheduler,
        shared::{ProfileSource, Shared},
    },
    io::{instance::InstanceArbiter, signals::SignalHandler},
    ipc::{ControlChannel, EventChannel, EventNotifier},
    schedule::Timetable,
};

/// The daemon, configured from the command line: `Hyprsunset::new(options).run()`.
pub struct Hyprsunset {
    options: RunOptions,
}

impl Hyprsunset {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    /// Run until a termination signal arrives or the compositor goes away.
    pub fn run(self) -> Result<()> {
        log_version!();

        let mut context = Context::new(self.options.config_path.clone());

        // Configuration and schedule
        let config = Config::load(context.config_path())?;
        log_block_start!("Configuration:");
        config.log_summary();

        let source = ProfileSource {
            profiles: config.profiles(),
            location: config.location(),
        };
        let timetable = source.resolve(Local::now().date_naive());
        log_block_start!("Loaded {} profile(s)", timetable.len());
        timetable.log_summary();

        let color = initial_color(&self.options, &config, &timetable)?;

        // Single instance per session
        let paths = RuntimePaths::from_env();
        let session = session_id()?;
        let instance = InstanceArbiter::new(&paths.instance_dir, session).acquire()?;

        // Compositor
        context.enter(Phase::AwaitingProtocolHandshake);
        let display = CtmBackend::connect()?;
        let connection = display.connection();

        let shared = Arc::new(Shared::new(color, timetable, source));

        // IPC, both optional
        let control = start_control(&paths, &shared);
        let (notifier, events) = start_events(&paths);

        let mut coordinator = Coordinator::new(CoordinatorParams {
            display: Box::new(display),
            shared: shared.clone(),
            notifier,
            context,
        });

        {
            let state = shared.lock();
            let settings = state.color.settings();
            log_block_start!(
                "Applying {}K, gamma {:.0}%{}",
                settings.temperature,
                settings.gamma * 100.0,
                if settings.identity { " (identity)" } else { "" }
            );
            log_indented!("CTM: {}", state.color.matrix());
        }
        coordinator.apply_current();

        let signals = SignalHandler::install(shared.clone())?;
        let scheduler = scheduler::spawn(shared.clone())?;
        let poller = Poller::spawn(connection, shared.clone())?;

        log_block_start!("Running (PID {})", std::process::id());
        let result = coordinator.run();

        // Shutdown
        shared.request_terminate();
        poller.shutdown();
        join("scheduler", scheduler);
        if let Some(handle) = control {
            join("control channel", handle);
        }
        signals.close();
        // Drops the last event notifier, letting the event thread finish
        coordinator.finish();
        if let Some(handle) = events {
            join("event channel", handle);
        }
        drop(instance);

        if result.is_ok() {
            log_block_start!("Stopped");
            log_end!();
        }
        result
    }
}

/// Initial color state: the active profile if there is one, otherwise the
/// command-line values, otherwise the defaults.
fn initial_color(options: &RunOptions, config: &Config, timetable: &Timetable) -> Result<ColorState> {
    let max_gamma = options
        .max_gamma
        .map(|percent| percent / 100.0)
        .unwrap_or_else(|| config.max_gamma());

    let settings = match timetable.active(Local::now().time()) {
        Some(profile) => {
            log_decorated!("Active profile from {}", profile.at.format("%H:%M"));
            profile.settings
        }
        None => ColorSettings {
            temperature: options.temperature.unwrap_or(DEFAULT_TEMP),
            gamma: options
                .gamma
                .map(|percent| percent / 100.0)
                .unwrap_or(DEFAULT_GAMMA),
            identity: options.identity,
        },
    };

    ColorState::new(settings, max_gamma).context("Invalid initial color settings")
}

fn start_control(paths: &RuntimePaths, shared: &Arc<Shared>) -> Option<JoinHandle<()>> {
    let channel = match ControlChannel::bind(&paths.control_socket) {
        Ok(channel) => channel,
        Err(e) => {
            log_warning!("Control channel disabled: {:#}", e);
            return None;
        }
    };
    log_decorated!("Control socket: {}", channel.path().display());

    match channel.spawn(shared.clone()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            log_warning!("Control channel disabled: {:#}", e);
            None
        }
    }
}

fn start_events(paths: &RuntimePaths) -> (Option<EventNotifier>, Option<JoinHandle<()>>) {
    let channel = match EventChannel::bind(&paths.event_socket) {
        Ok(channel) => channel,
        Err(e) => {
            log_warning!("Event channel disabled: {:#}", e);
            return (None, None);
        }
    };
    log_decorated!("Event socket: {}", channel.path().display());

    match channel.spawn() {
        Ok((notifier, handle)) => (Some(notifier), Some(handle)),
        Err(e) => {
            log_warning!("Event channel disabled: {:#}", e);
            (None, None)
        }
    }
}

fn join(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log_warning!("The {} thread panicked", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ProfileTime, ScheduledProfile};
    use chrono::NaiveTime;

    #[test]
    fn test_initial_color_without_profiles_uses_options() {
        let options = RunOptions {
            temperature: Some(4000),
            gamma: Some(80.0),
            max_gamma: Some(150.0),
            ..Default::default()
        };
        let color = initial_color(&options, &Config::default(), &Timetable::default()).unwrap();
        assert_eq!(color.temperature(), 4000);
        assert!((color.gamma() - 0.8).abs() < 1e-6);
        assert!((color.max_gamma() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_initial_color_defaults() {
        let color = initial_color(
            &RunOptions::default(),
            &Config::default(),
            &Timetable::default(),
        )
        .unwrap();
        assert_eq!(color.temperature(), DEFAULT_TEMP);
        assert_eq!(color.gamma(), DEFAULT_GAMMA);
        assert!(!color.identity());
    }

    #[test]
    fn test_initial_color_prefers_active_profile() {
        let at = NaiveTime::MIN;
        let timetable = Timetable::from_entries(vec![ScheduledProfile {
            at,
            source: ProfileTime::Clock(at),
            settings: ColorSettings {
                temperature: 3200,
                gamma: 0.7,
                identity: false,
            },
        }]);
        let options = RunOptions {
            temperature: Some(5000),
            ..Default::default()
        };
        let color = initial_color(&options, &Config::default(), &timetable).unwrap();
        assert_eq!(color.temperature(), 3200);
    }

    #[test]
    fn test_initial_gamma_above_ceiling_is_rejected() {
        let options = RunOptions {
            gamma: Some(150.0),
            ..Default::default()
        };
        assert!(initial_color(&options, &Config::default(), &Timetable::default()).is_err());
    }
}
