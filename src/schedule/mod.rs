//! Profile timetable: resolution, active profile lookup and next switch time.
//!
//! Profiles come from the configuration with either a clock time or a symbolic
//! `sunrise`/`sunset`. [`Timetable::resolve`] turns them into concrete
//! times-of-day for one date and sorts them. The timetable is cyclic: the last
//! profile of the day stays active past midnight until the first one starts.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::color::ColorSettings;
use crate::geo::{Location, SolarCalculator, SolarTimes, format_time};


/// When a profile becomes active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileTime {
    Clock(NaiveTime),
    Sunrise,
    Sunset,
}

impl ProfileTime {
    pub fn is_symbolic(&self) -> bool {
        !matches!(self, ProfileTime::Clock(_))
    }
}

impl FromStr for ProfileTime {
    type Err = anyhow::Error;

    /// Parse `HH:MM`, `sunrise` or `sunset`.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "sunrise" => return Ok(ProfileTime::Sunrise),
            "sunset" => return Ok(ProfileTime::Sunset),
            _ => {}
        }

        let (hour, minute) = s
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("expected HH:MM, sunrise or sunset, got '{s}'"))?;
        let hour: u32 = hour
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid hour in '{s}'"))?;
        let minute: u32 = minute
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid minute in '{s}'"))?;

        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(ProfileTime::Clock)
            .ok_or_else(|| anyhow::anyhow!("time '{s}' is out of range"))
    }
}

impl fmt::Display for ProfileTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileTime::Clock(t) => write!(f, "{}", t.format("%H:%M")),
            ProfileTime::Sunrise => write!(f, "sunrise"),
            ProfileTime::Sunset => write!(f, "sunset"),
        }
    }
}

/// A configured color profile, before time resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    pub time: ProfileTime,
    pub settings: ColorSettings,
}

/// A profile pinned to a concrete time of day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledProfile {
    pub at: NaiveTime,
    pub source: ProfileTime,
    pub settings: ColorSettings,
}

/// Why a symbolic profile time could not be resolved.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("profile uses '{0}' but no latitude/longitude is configured")]
    MissingLocation(ProfileTime),
    #[error("'{0}' does not occur on {1} at this location (polar day or night)")]
    PolarEvent(ProfileTime, NaiveDate),
}

/// Sorted, cyclic list of resolved profiles for one day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timetable {
    entries: Vec<ScheduledProfile>,
    resolved_for: Option<NaiveDate>,
}

impl Timetable {
    /// Build a timetable from already-resolved entries.
    pub fn from_entries(mut entries: Vec<ScheduledProfile>) -> Self {
        // Stable: equal times keep their configured order
        entries.sort_by_key(|e| e.at);
        Self {
            entries,
            resolved_for: None,
        }
    }

    /// Resolve `profiles` for `date` and sort them by time of day.
    ///
    /// Profiles whose symbolic time cannot be resolved are dropped with an
    /// error log; the rest of the timetable is still usable. Solar times are
    /// computed at most once per call.
    pub fn resolve(profiles: &[Profile], location: Option<Location>, date: NaiveDate) -> Self {
        let mut solar: Option<SolarTimes> = None;
        let mut entries = Vec::with_capacity(profiles.len());

        for profile in profiles {
            match resolve_time(profile.time, location, date, &mut solar) {
                Ok(at) => entries.push(ScheduledProfile {
                    at,
                    source: profile.time,
                    settings: profile.settings,
                }),
                Err(e) => {
                    log_error!("Dropping profile: {}", e);
                }
            }
        }

        let mut timetable = Self::from_entries(entries);
        timetable.resolved_for = Some(date);

        for pair in timetable.entries.windows(2) {
            if pair[0].at == pair[1].at {
                log_warning!(
                    "Two profiles start at {}; the later one in the config wins",
                    pair[0].at.format("%H:%M")
                );
            }
        }

        timetable
    }

    pub fn entries(&self) -> &[ScheduledProfile] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&ScheduledProfile> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Date the symbolic times were resolved for, if built by [`Timetable::resolve`].
    pub fn resolved_for(&self) -> Option<NaiveDate> {
        self.resolved_for
    }

    /// Index of the profile in effect at `now`.
    ///
    /// This is the last profile whose time is `<= now`. Before the first
    /// profile of the day the last one is still in effect from yesterday.
    pub fn active_index(&self, now: NaiveTime) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let started = self.entries.partition_point(|e| e.at <= now);
        Some(if started == 0 {
            self.entries.len() - 1
        } else {
            started - 1
        })
    }

    pub fn active(&self, now: NaiveTime) -> Option<&ScheduledProfile> {
        self.active_index(now).and_then(|i| self.entries.get(i))
    }

    /// The profile following the active one and the instant it takes over.
    ///
    /// The instant is today at the profile's time, or tomorrow if that is not
    /// strictly after `now`.
    pub fn next_switch(&self, now: NaiveDateTime) -> Option<(usize, NaiveDateTime)> {
        let active = self.active_index(now.time())?;
        let next = (active + 1) % self.entries.len();

        let mut instant = now.date().and_time(self.entries[next].at);
        if instant <= now {
            instant += Duration::days(1);
        }
        Some((next, instant))
    }

    /// Log the timetable, one line per profile.
    pub fn log_summary(&self) {
        if self.entries.is_empty() {
            log_decorated!("No profiles scheduled");
            return;
        }
        log_decorated!("Scheduled profiles:");
        for entry in &self.entries {
            let label = if entry.source.is_symbolic() {
                format!("{} ({})", entry.at.format("%H:%M"), entry.source)
            } else {
                entry.at.format("%H:%M").to_string()
            };
            log_indented!(
                "{}: {}K, gamma {:.0}%{}",
                label,
                entry.settings.temperature,
                entry.settings.gamma * 100.0,
                if entry.settings.identity { ", identity" } else { "" }
            );
        }
    }
}

fn resolve_time(
    time: ProfileTime,
    location: Option<Location>,
    date: NaiveDate,
    cache: &mut Option<SolarTimes>,
) -> Result<NaiveTime, ResolveError> {
    if let ProfileTime::Clock(t) = time {
        return Ok(t);
    }

    let location = location.ok_or(ResolveError::MissingLocation(time))?;
    let times = *cache.get_or_insert_with(|| {
        let times = SolarCalculator::new(location).compute(date);
        log_debug!(
            "Solar times for {}: sunrise {}, sunset {}",
            date,
            format_time(times.sunrise),
            format_time(times.sunset)
        );
        times
    });

    let hours = match time {
        ProfileTime::Sunrise => times.sunrise,
        _ => times.sunset,
    }
    .ok_or(ResolveError::PolarEvent(time, date))?;

    let total = ((hours * 60.0).round() as i64).rem_euclid(1440) as u32;
    NaiveTime::from_hms_opt(total / 60, total % 60, 0).ok_or(ResolveError::PolarEvent(time, date))
}
