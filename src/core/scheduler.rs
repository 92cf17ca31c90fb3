//! Timed profile switching.
//!
//! The scheduler thread sleeps until the next profile's start time, then, under
//! the shared lock, applies that profile's settings and marks a reload as due
//! so the coordinator pushes the new matrix. Timetables with sun-relative
//! profiles are re-resolved when the date changes.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::common::constants::SCHEDULER_MAX_SLEEP_SECS;
use crate::core::shared::{LoopState, Shared, SleepOutcome};

/// Spawn the scheduler thread. It exits once `shared` starts terminating.
pub fn spawn(shared: Arc<Shared>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("scheduler".into())
        .spawn(move || run(&shared))
        .context("Failed to spawn scheduler thread")
}

fn run(shared: &Shared) {
    let max_chunk = Duration::from_secs(SCHEDULER_MAX_SLEEP_SECS);

    loop {
        let (timetable, generation, source) = {
            let state = shared.lock();
            if state.terminate {
                break;
            }
            (state.timetable.clone(), state.generation, state.source.clone())
        };

        let now = Local::now().naive_local();
        let today = now.date();

        // Sunrise and sunset move every day
        if source.has_symbolic() && timetable.resolved_for() != Some(today) {
            let fresh = source.resolve(today);
            let mut state = shared.lock();
            if state.generation == generation {
                log_block_start!("Resolved profiles for {}", today);
                fresh.log_summary();
                refresh_timetable(&mut state, fresh);
                shared.notify();
            }
            continue;
        }

        let next = timetable.next_switch(now).map(|(_, at)| at);
        let deadline = match next {
            Some(at) if source.has_symbolic() => Some(at.min(next_midnight(now))),
            Some(at) => Some(at),
            None if source.has_symbolic() => Some(next_midnight(now)),
            None => None,
        };

        let Some(deadline) = deadline else {
            // Nothing scheduled; wait for a new timetable or shutdown
            let far = now + ChronoDuration::days(1);
            if shared.sleep_until(far, generation, max_chunk) == SleepOutcome::Terminated {
                break;
            }
            continue;
        };

        log_debug!("Next profile switch at {}", deadline.format("%Y-%m-%d %H:%M:%S"));

        match shared.sleep_until(deadline, generation, max_chunk) {
            SleepOutcome::Terminated => break,
            SleepOutcome::Rescheduled => continue,
            SleepOutcome::Elapsed => {}
        }

        let mut state = shared.lock();
        if state.generation != generation || state.terminate {
            continue;
        }
        if switch_to_active(&mut state) {
            shared.notify();
        }
    }

    log_debug!("Scheduler stopped");
}

/// Replace the timetable, bumping the generation and re-selecting the active
/// profile. The active profile's settings are applied to the color state.
pub(crate) fn install_timetable(state: &mut LoopState, timetable: crate::schedule::Timetable) {
    state.timetable = Arc::new(timetable);
    state.generation += 1;
    switch_to_active(state);
}

/// Swap in the same profiles resolved for a new day.
///
/// Sunrise and sunset drift by minutes, which is not a profile boundary: the
/// color state is only touched if a different profile is now in effect, so
/// manual adjustments survive until the next real switch.
pub(crate) fn refresh_timetable(state: &mut LoopState, timetable: crate::schedule::Timetable) -> bool {
    let previous = state
        .active_index
        .and_then(|i| state.timetable.get(i).copied());

    state.timetable = Arc::new(timetable);
    state.generation += 1;

    let index = state.timetable.active_index(Local::now().time());
    let current = index.and_then(|i| state.timetable.get(i).copied());
    let same_profile = match (previous, current) {
        (Some(p), Some(c)) => p.source == c.source && p.settings == c.settings,
        (None, None) => true,
        _ => false,
    };

    if same_profile {
        state.active_index = index;
        return false;
    }
    switch_to_active(state)
}

/// Apply the profile in effect right now. Returns whether a reload was queued.
///
/// Looking the profile up at wake time, rather than trusting the index the
/// sleep was computed for, also covers several profiles sharing one time.
pub(crate) fn switch_to_active(state: &mut LoopState) -> bool {
    let now = Local::now().time();
    let Some(index) = state.timetable.active_index(now) else {
        state.active_index = None;
        return false;
    };
    let Some(profile) = state.timetable.get(index).copied() else {
        return false;
    };

    if state.active_index == Some(index) && state.color.settings() == profile.settings {
        return false;
    }

    match state.color.apply(profile.settings) {
        Ok(_) => {
            log_block_start!(
                "Switching to profile from {}",
                profile.at.format("%H:%M")
            );
            state.active_index = Some(index);
            state.reload_due = true;
            state.switched_to = Some(profile.at);
            true
        }
        Err(e) => {
            log_error!(
                "Profile from {} cannot be applied: {}",
                profile.at.format("%H:%M"),
                e
            );
            state.active_index = Some(index);
            false
        }
    }
}

fn next_midnight(now: NaiveDateTime) -> NaiveDateTime {
    (now.date() + ChronoDuration::days(1)).and_time(chrono::NaiveTime::MIN)
}
