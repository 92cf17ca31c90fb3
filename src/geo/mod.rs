//! Astronomical sunrise/sunset calculation.
//!
//! Profiles may use `sunrise` or `sunset` instead of a clock time. Those are
//! resolved here from the configured latitude/longitude and the local UTC
//! offset, once per day.

pub mod solar;


pub use solar::{Location, SolarCalculator, SolarTimes, format_time, julian_day};
