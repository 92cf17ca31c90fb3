use chrono::{NaiveDate, NaiveTime, Timelike};
use hyprsunset::color::ColorSettings;
use hyprsunset::schedule::{ProfileTime, ScheduledProfile, Timetable};
use proptest::prelude::*;

fn time_strategy() -> impl Strategy<Value = NaiveTime> {
    (0u32..24, 0u32..60, 0u32..60).prop_map(|(h, m, s)| NaiveTime::from_hms_opt(h, m, s).unwrap())
}

/// Profiles start on whole minutes; a small pool of minutes forces ties
fn timetable_strategy() -> impl Strategy<Value = Timetable> {
    prop::collection::vec((0u32..24, prop::sample::select(vec![0u32, 15, 30, 45]), 1000u32..=20000), 1..8)
        .prop_map(|raw| {
            let entries = raw
                .into_iter()
                .map(|(h, m, temperature)| {
                    let at = NaiveTime::from_hms_opt(h, m, 0).unwrap();
                    ScheduledProfile {
                        at,
                        source: ProfileTime::Clock(at),
                        settings: ColorSettings {
                            temperature,
                            gamma: 1.0,
                            identity: false,
                        },
                    }
                })
                .collect();
            Timetable::from_entries(entries)
        })
}

proptest! {
    #[test]
    fn test_entries_are_sorted(timetable in timetable_strategy()) {
        let entries = timetable.entries();
        prop_assert!(entries.windows(2).all(|w| w[0].at <= w[1].at));
    }

    /// The active profile is the last one that already started today, or the
    /// last of the day when none has started yet
    #[test]
    fn test_active_index_is_last_started(
        timetable in timetable_strategy(),
        now in time_strategy()
    ) {
        let index = timetable.active_index(now).unwrap();
        let entries = timetable.entries();

        match entries.iter().rposition(|e| e.at <= now) {
            Some(last_started) => prop_assert_eq!(index, last_started),
            None => prop_assert_eq!(index, entries.len() - 1),
        }
    }

    /// The next switch is strictly in the future, within one day, and lands on
    /// a profile start time
    #[test]
    fn test_next_switch_is_within_a_day(
        timetable in timetable_strategy(),
        now in time_strategy()
    ) {
        let now = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap().and_time(now);
        let (next, at) = timetable.next_switch(now).unwrap();

        prop_assert!(at > now);
        prop_assert!(at - now <= chrono::Duration::days(1));
        prop_assert_eq!(at.time(), timetable.entries()[next].at);
        prop_assert_eq!(at.time().second(), 0);
    }

    /// Right at the switch instant the profile that was announced is active,
    /// or a later one sharing the same start time
    #[test]
    fn test_switch_instant_activates_announced_time(
        timetable in timetable_strategy(),
        now in time_strategy()
    ) {
        let now = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap().and_time(now);
        let (next, at) = timetable.next_switch(now).unwrap();

        let active = timetable.active_index(at.time()).unwrap();
        prop_assert_eq!(timetable.entries()[active].at, timetable.entries()[next].at);
        prop_assert!(active >= next);
    }
}
