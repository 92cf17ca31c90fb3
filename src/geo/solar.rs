//! Sunrise and sunset times using the NOAA solar position equations.
//!
//! The calculation works in UTC minutes from midnight and converts to local
//! decimal hours at the end. Each event is computed twice: the first pass uses
//! the Julian century at 0h UTC, the second recomputes the sun's position at
//! the time found by the first pass, which brings the error below a minute.
//!
//! Events that do not occur on a date (polar day or night) are reported as
//! `None`, never as a wrapped clock time.

use chrono::{Datelike, NaiveDate};

/// Solar zenith of the upper limb at sunrise/sunset, including refraction.
const SUNRISE_ZENITH_DEG: f64 = 90.833;
/// Slack allowed on the hour-angle cosine before declaring the event missing.
const HOUR_ANGLE_TOLERANCE: f64 = 1e-9;
const MINUTES_PER_DAY: f64 = 1440.0;

/// Geographic position plus the UTC offset used to express results in local time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone_offset_hours: f64,
}

/// Local sunrise and sunset in decimal hours, `None` when the event does not happen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarTimes {
    pub sunrise: Option<f64>,
    pub sunset: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SolarEvent {
    Sunrise,
    Sunset,
}

/// Computes sunrise/sunset for a fixed location.
#[derive(Debug, Clone, Copy)]
pub struct SolarCalculator {
    location: Location,
}

impl SolarCalculator {
    pub fn new(location: Location) -> Self {
        Self { location }
    }

    /// Sunrise and sunset on `date`, in local time.
    pub fn compute(&self, date: NaiveDate) -> SolarTimes {
        let jd = julian_day(date.year(), date.month(), date.day());
        SolarTimes {
            sunrise: self.event_local_hours(jd, SolarEvent::Sunrise),
            sunset: self.event_local_hours(jd, SolarEvent::Sunset),
        }
    }

    fn event_local_hours(&self, jd: f64, event: SolarEvent) -> Option<f64> {
        let utc_minutes = event_utc_minutes(jd, self.location.latitude, self.location.longitude, event)?;
        let local = (utc_minutes + self.location.timezone_offset_hours * 60.0)
            .rem_euclid(MINUTES_PER_DAY);
        Some(local / 60.0)
    }
}

/// Format decimal hours as `HH:MM`, rounding to the nearest minute.
///
/// Missing or negative input renders as `--:--`.
pub fn format_time(hours: Option<f64>) -> String {
    match hours {
        Some(h) if h.is_finite() && h >= 0.0 => {
            let total = ((h * 60.0).round() as i64).rem_euclid(1440);
            format!("{:02}:{:02}", total / 60, total % 60)
        }
        _ => "--:--".to_string(),
    }
}

/// Julian Day at 0h UTC for a Gregorian calendar date.
pub fn julian_day(year: i32, month: u32, day: u32) -> f64 {
    let (mut y, mut m) = (year, month as i32);
    if m <= 2 {
        y -= 1;
        m += 12;
    }
    let a = y / 100;
    let b = 2 - a + a / 4;

    (365.25 * f64::from(y + 4716)).floor() + (30.6001 * f64::from(m + 1)).floor()
        + f64::from(day)
        + f64::from(b)
        - 1524.5
}

fn julian_century(jd: f64) -> f64 {
    (jd - 2_451_545.0) / 36_525.0
}

/// Event time in UTC minutes from midnight, refined over two passes.
fn event_utc_minutes(jd: f64, latitude: f64, longitude: f64, event: SolarEvent) -> Option<f64> {
    let mut t = julian_century(jd);
    let mut minutes = 0.0;

    for pass in 0..2 {
        let eq_time = equation_of_time(t);
        let hour_angle = hour_angle_deg(latitude, sun_declination(t))?;

        let solar_noon = 720.0 - 4.0 * longitude - eq_time;
        let offset = 4.0 * hour_angle;
        minutes = match event {
            SolarEvent::Sunrise => solar_noon - offset,
            SolarEvent::Sunset => solar_noon + offset,
        }
        .rem_euclid(MINUTES_PER_DAY);

        if pass == 0 {
            t = julian_century(jd + minutes / MINUTES_PER_DAY);
        }
    }

    Some(minutes)
}

fn geom_mean_long_sun(t: f64) -> f64 {
    (280.46646 + t * (36000.76983 + t * 0.0003032)).rem_euclid(360.0)
}

fn geom_mean_anomaly_sun(t: f64) -> f64 {
    357.52911 + t * (35999.05029 - 0.0001537 * t)
}

fn eccentricity_earth_orbit(t: f64) -> f64 {
    0.016708634 - t * (0.000042037 + 0.0000001267 * t)
}

fn sun_eq_of_center(t: f64) -> f64 {
    let m = geom_mean_anomaly_sun(t).to_radians();
    m.sin() * (1.914602 - t * (0.004817 + 0.000014 * t))
        + (2.0 * m).sin() * (0.019993 - 0.000101 * t)
        + (3.0 * m).sin() * 0.000289
}

fn sun_apparent_long(t: f64) -> f64 {
    let true_long = geom_mean_long_sun(t) + sun_eq_of_center(t);
    let omega = 125.04 - 1934.136 * t;
    true_long - 0.00569 - 0.00478 * omega.to_radians().sin()
}

fn mean_obliquity_of_ecliptic(t: f64) -> f64 {
    let seconds = 21.448 - t * (46.815 + t * (0.00059 - t * 0.001813));
    23.0 + (26.0 + seconds / 60.0) / 60.0
}

fn obliquity_correction(t: f64) -> f64 {
    let omega = 125.04 - 1934.136 * t;
    mean_obliquity_of_ecliptic(t) + 0.00256 * omega.to_radians().cos()
}

fn sun_declination(t: f64) -> f64 {
    let e = obliquity_correction(t).to_radians();
    let lambda = sun_apparent_long(t).to_radians();
    (e.sin() * lambda.sin()).asin().to_degrees()
}

/// Equation of time in minutes.
fn equation_of_time(t: f64) -> f64 {
    let epsilon = obliquity_correction(t).to_radians();
    let l0 = geom_mean_long_sun(t).to_radians();
    let e = eccentricity_earth_orbit(t);
    let m = geom_mean_anomaly_sun(t).to_radians();

    let y = (epsilon / 2.0).tan().powi(2);

    let eq = y * (2.0 * l0).sin() - 2.0 * e * m.sin() + 4.0 * e * y * m.sin() * (2.0 * l0).cos()
        - 0.5 * y * y * (4.0 * l0).sin()
        - 1.25 * e * e * (2.0 * m).sin();

    4.0 * eq.to_degrees()
}

/// Hour angle of sunrise in degrees, `None` when the sun never crosses the horizon.
fn hour_angle_deg(latitude: f64, declination: f64) -> Option<f64> {
    let lat = latitude.to_radians();
    let decl = declination.to_radians();

    let cos_ha = SUNRISE_ZENITH_DEG.to_radians().cos() / (lat.cos() * decl.cos())
        - lat.tan() * decl.tan();

    if !cos_ha.is_finite()
        || cos_ha < -1.0 - HOUR_ANGLE_TOLERANCE
        || cos_ha > 1.0 + HOUR_ANGLE_TOLERANCE
    {
        return None;
    }

    Some(cos_ha.clamp(-1.0, 1.0).acos().to_degrees())
}
