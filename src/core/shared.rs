//! State shared between the coordinator and its background threads.
//!
//! Everything that mutates the color state or the schedule does so under one
//! mutex. The `wake` condition variable wakes the coordinator loop (and the
//! scheduler, which re-checks its deadline); `replied` wakes a control
//! connection waiting for the answer to its request.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Offset};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::color::ColorState;
use crate::geo::Location;
use crate::schedule::{Profile, Timetable};

/// The unresolved inputs a timetable is built from.
#[derive(Debug, Clone, Default)]
pub struct ProfileSource {
    pub profiles: Vec<Profile>,
    pub location: Option<Location>,
}

impl ProfileSource {
    pub fn has_symbolic(&self) -> bool {
        self.profiles.iter().any(|p| p.time.is_symbolic())
    }

    /// The configured location with the UTC offset currently in effect.
    pub fn location_now(&self) -> Option<Location> {
        let offset = Local::now().offset().fix().local_minus_utc();
        self.location.map(|l| Location {
            timezone_offset_hours: f64::from(offset) / 3600.0,
            ..l
        })
    }

    /// Resolve the profiles for `date`.
    pub fn resolve(&self, date: NaiveDate) -> Timetable {
        Timetable::resolve(&self.profiles, self.location_now(), date)
    }
}

/// Data guarded by [`Shared`]'s mutex.
#[derive(Debug)]
pub struct LoopState {
    pub color: ColorState,
    pub timetable: Arc<Timetable>,
    pub source: Arc<ProfileSource>,
    /// Bumped whenever `timetable` is replaced.
    pub generation: u64,
    pub active_index: Option<usize>,

    /// The poller saw compositor events.
    pub should_process: bool,
    /// The scheduler applied a profile that still has to be pushed.
    pub reload_due: bool,
    /// Time of the profile the scheduler switched to, for the event notice.
    pub switched_to: Option<NaiveTime>,
    /// A configuration reload was requested.
    pub config_reload: bool,
    pub terminate: bool,

    pub pending_request: Option<String>,
    pub reply: Option<String>,
}

impl LoopState {
    fn has_work(&self) -> bool {
        self.should_process
            || self.reload_due
            || self.config_reload
            || self.terminate
            || self.pending_request.is_some()
    }
}

/// How a scheduler sleep ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SleepOutcome {
    /// The deadline passed.
    Elapsed,
    /// The timetable was replaced while sleeping.
    Rescheduled,
    Terminated,
}

pub struct Shared {
    state: Mutex<LoopState>,
    wake: Condvar,
    replied: Condvar,
}

impl Shared {
    pub fn new(color: ColorState, timetable: Timetable, source: ProfileSource) -> Self {
        let active_index = timetable.active_index(Local::now().time());
        Self {
            state: Mutex::new(LoopState {
                color,
                timetable: Arc::new(timetable),
                source: Arc::new(source),
                generation: 0,
                active_index,
                should_process: false,
                reload_due: false,
                switched_to: None,
                config_reload: false,
                terminate: false,
                pending_request: None,
                reply: None,
            }),
            wake: Condvar::new(),
            replied: Condvar::new(),
        }
    }

    /// Lock the state. A panic on another thread must not take the daemon down
    /// with it, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn notify(&self) {
        self.wake.notify_all();
    }

    pub fn is_terminating(&self) -> bool {
        self.lock().terminate
    }

    pub fn request_terminate(&self) {
        self.lock().terminate = true;
        self.wake.notify_all();
        self.replied.notify_all();
    }

    pub fn request_config_reload(&self) {
        self.lock().config_reload = true;
        self.wake.notify_all();
    }

    /// Called by the poller when compositor events are ready for dispatch.
    pub fn signal_readable(&self) {
        self.lock().should_process = true;
        self.wake.notify_all();
    }

    /// Block the coordinator until there is work or `timeout` passes.
    pub fn wait_for_work(&self, timeout: Duration) -> MutexGuard<'_, LoopState> {
        let guard = self.lock();
        match self
            .wake
            .wait_timeout_while(guard, timeout, |s| !s.has_work())
        {
            Ok((guard, _)) => guard,
            Err(e) => e.into_inner().0,
        }
    }

    /// Hand a control request to the coordinator and block until it replies.
    ///
    /// Returns `None` if the daemon starts shutting down first.
    pub fn submit_request(&self, request: String) -> Option<String> {
        let mut guard = self.lock();
        if guard.terminate {
            return None;
        }
        guard.pending_request = Some(request);
        guard.reply = None;
        self.wake.notify_all();

        let mut guard = match self
            .replied
            .wait_while(guard, |s| s.reply.is_none() && !s.terminate)
        {
            Ok(guard) => guard,
            Err(e) => e.into_inner(),
        };
        guard.reply.take()
    }

    /// Deliver the reply for the request taken by the coordinator.
    pub fn post_reply(&self, reply: String) {
        self.lock().reply = Some(reply);
        self.replied.notify_all();
    }

    /// Sleep until the local wall clock reaches `deadline`.
    ///
    /// Wakes early if the timetable generation changes or shutdown starts.
    /// The clock is re-read at least every `max_chunk` so that suspend and
    /// clock adjustments do not push the switch out.
    pub fn sleep_until(
        &self,
        deadline: NaiveDateTime,
        generation: u64,
        max_chunk: Duration,
    ) -> SleepOutcome {
        let mut guard = self.lock();
        loop {
            if guard.terminate {
                return SleepOutcome::Terminated;
            }
            if guard.generation != generation {
                return SleepOutcome::Rescheduled;
            }

            let now = Local::now().naive_local();
            if now >= deadline {
                return SleepOutcome::Elapsed;
            }
            let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
            let chunk = remaining.min(max_chunk);

            guard = match self.wake.wait_timeout(guard, chunk) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorSettings;
    use std::thread;

    fn shared() -> Arc<Shared> {
        let color = ColorState::new(
            ColorSettings {
                temperature: 6000,
                gamma: 1.0,
                identity: false,
            },
            1.0,
        )
        .unwrap();
        Arc::new(Shared::new(color, Timetable::default(), ProfileSource::default()))
    }

    #[test]
    fn test_submit_request_waits_for_reply() {
        let shared = shared();

        let coordinator = {
            let shared = shared.clone();
            thread::spawn(move || {
                let mut guard = shared.wait_for_work(Duration::from_secs(5));
                let request = guard.pending_request.take().unwrap();
                drop(guard);
                shared.post_reply(format!("echo {request}"));
            })
        };

        let reply = shared.submit_request("ping".into());
        coordinator.join().unwrap();
        assert_eq!(reply.as_deref(), Some("echo ping"));
    }

    #[test]
    fn test_terminate_releases_waiting_request() {
        let shared = shared();

        let client = {
            let shared = shared.clone();
            thread::spawn(move || shared.submit_request("gamma".into()))
        };

        // Wait until the request is visible, then shut down without replying
        loop {
            if shared.lock().pending_request.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        shared.request_terminate();

        assert_eq!(client.join().unwrap(), None);
        assert!(shared.submit_request("gamma".into()).is_none());
    }

    #[test]
    fn test_wait_for_work_times_out_without_work() {
        let shared = shared();
        let guard = shared.wait_for_work(Duration::from_millis(20));
        assert!(!guard.has_work());
    }

    #[test]
    fn test_sleep_until_past_deadline_elapses() {
        let shared = shared();
        let past = Local::now().naive_local() - chrono::Duration::seconds(1);
        assert_eq!(
            shared.sleep_until(past, 0, Duration::from_secs(1)),
            SleepOutcome::Elapsed
        );
    }

    #[test]
    fn test_sleep_until_interrupted_by_new_generation() {
        let shared = shared();
        let far = Local::now().naive_local() + chrono::Duration::hours(1);

        let sleeper = {
            let shared = shared.clone();
            thread::spawn(move || shared.sleep_until(far, 0, Duration::from_secs(60)))
        };
        thread::sleep(Duration::from_millis(20));
        shared.lock().generation += 1;
        shared.notify();

        assert_eq!(sleeper.join().unwrap(), SleepOutcome::Rescheduled);
    }

    #[test]
    fn test_sleep_until_interrupted_by_terminate() {
        let shared = shared();
        let far = Local::now().naive_local() + chrono::Duration::hours(1);

        let sleeper = {
            let shared = shared.clone();
            thread::spawn(move || shared.sleep_until(far, 0, Duration::from_secs(60)))
        };
        thread::sleep(Duration::from_millis(20));
        shared.request_terminate();

        assert_eq!(sleeper.join().unwrap(), SleepOutcome::Terminated);
    }
}
