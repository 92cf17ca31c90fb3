//! Configuration for hyprsunset.
//!
//! The configuration file is `$XDG_CONFIG_HOME/hypr/hyprsunset.toml` unless a
//! path is given with `--config`. Running without a file is fine: the daemon
//! then applies the command-line values (or built-in defaults) and never
//! switches profiles.
//!
//! ```toml
//! version = 1
//! max_gamma = 100          # Ceiling for gamma as a percentage (100-200)
//!
//! latitude = 52.2297       # Needed only for "sunrise"/"sunset" profiles
//! longitude = 21.0122
//!
//! [[profile]]
//! time = "sunrise"         # "HH:MM", "sunrise" or "sunset"
//! identity = true
//!
//! [[profile]]
//! time = "21:00"
//! temperature = 3500       # Kelvin (1000-20000)
//! gamma = 0.9              # Fraction, 1.0 leaves brightness unchanged
//! ```
//!
//! Every field has a default, so partial files and files written for older
//! versions keep loading. Whole-file problems (coordinates out of range, an
//! unknown version) fail the load; a broken profile only drops that profile.

pub mod loading;
pub mod validation;


use chrono::{Local, Offset};
use serde::Deserialize;

use crate::color::ColorSettings;
use crate::common::constants::*;
use crate::geo::Location;
use crate::schedule::Profile;

pub use loading::{default_config_path, load_from_path};
pub use validation::{validate_config, validate_profile};

/// Top-level configuration file contents.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Schema version the file was written for.
    pub version: u32,
    /// Gamma ceiling as a percentage.
    pub max_gamma: u32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(rename = "profile")]
    pub profiles: Vec<ProfileConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            max_gamma: (DEFAULT_MAX_GAMMA * 100.0) as u32,
            latitude: None,
            longitude: None,
            profiles: Vec::new(),
        }
    }
}

/// One `[[profile]]` table as written in the file.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProfileConfig {
    pub time: String,
    pub temperature: u32,
    pub gamma: f32,
    pub identity: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            time: DEFAULT_PROFILE_TIME.to_string(),
            temperature: DEFAULT_TEMP,
            gamma: DEFAULT_GAMMA,
            identity: false,
        }
    }
}

impl Config {
    /// Load from `path` if given, otherwise from the default location.
    ///
    /// A missing default file yields the built-in defaults; a missing explicit
    /// path is an error.
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        loading::load(path)
    }

    /// Gamma ceiling as a fraction.
    pub fn max_gamma(&self) -> f32 {
        self.max_gamma as f32 / 100.0
    }

    /// Location for sun-relative profiles, using the current local UTC offset.
    pub fn location(&self) -> Option<Location> {
        let offset = Local::now().offset().fix().local_minus_utc();
        self.location_with_offset(f64::from(offset) / 3600.0)
    }

    pub fn location_with_offset(&self, timezone_offset_hours: f64) -> Option<Location> {
        Some(Location {
            latitude: self.latitude?,
            longitude: self.longitude?,
            timezone_offset_hours,
        })
    }

    /// The configured profiles that passed validation, in file order.
    pub fn profiles(&self) -> Vec<Profile> {
        self.profiles
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| match validate_profile(raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    log_error!("Ignoring profile #{} ({}): {}", i + 1, raw.time, e);
                    None
                }
            })
            .collect()
    }

    /// Log the configuration summary shown at startup.
    pub fn log_summary(&self) {
        log_indented!("Max gamma: {}%", self.max_gamma);
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => log_indented!("Location: {:.4}°, {:.4}°", lat, lon),
            _ => log_indented!("Location: not set"),
        }
        log_indented!("Profiles: {}", self.profiles.len());
    }
}

impl From<&ProfileConfig> for ColorSettings {
    fn from(raw: &ProfileConfig) -> Self {
        ColorSettings {
            temperature: raw.temperature,
            gamma: raw.gamma,
            identity: raw.identity,
        }
    }
}
