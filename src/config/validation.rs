//! Configuration validation.
//!
//! File-level checks fail the whole load. Profile checks are applied one by
//! one so that a single bad entry does not take the schedule down.

use anyhow::{Context, Result};

use super::{Config, ProfileConfig};
use crate::common::constants::*;
use crate::schedule::{Profile, ProfileTime};

/// Validate settings that apply to the whole file.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.version > CONFIG_VERSION {
        anyhow::bail!(
            "config version {} is newer than supported version {}",
            config.version,
            CONFIG_VERSION
        );
    }

    if !(MINIMUM_GAMMA_CEILING..=MAXIMUM_GAMMA_CEILING).contains(&config.max_gamma) {
        anyhow::bail!(
            "max_gamma ({}%) must be between {}% and {}%",
            config.max_gamma,
            MINIMUM_GAMMA_CEILING,
            MAXIMUM_GAMMA_CEILING
        );
    }

    if let Some(lat) = config.latitude
        && !(-90.0..=90.0).contains(&lat)
    {
        anyhow::bail!("latitude must be between -90 and 90 degrees (got {})", lat);
    }

    if let Some(lon) = config.longitude
        && !(-180.0..=180.0).contains(&lon)
    {
        anyhow::bail!(
            "longitude must be between -180 and 180 degrees (got {})",
            lon
        );
    }

    if config.latitude.is_some() != config.longitude.is_some() {
        anyhow::bail!("latitude and longitude must be set together");
    }

    Ok(())
}

/// Validate one profile table and convert it into a [`Profile`].
///
/// Gamma is only checked for sign here; the ceiling can be raised on the
/// command line, so it is enforced when the profile is applied.
pub fn validate_profile(raw: &ProfileConfig) -> Result<Profile> {
    let time: ProfileTime = raw
        .time
        .parse()
        .with_context(|| format!("invalid time '{}'", raw.time))?;

    if !(MINIMUM_TEMP..=MAXIMUM_TEMP).contains(&raw.temperature) {
        anyhow::bail!(
            "temperature {}K must be between {} and {}K",
            raw.temperature,
            MINIMUM_TEMP,
            MAXIMUM_TEMP
        );
    }

    if !raw.gamma.is_finite() || raw.gamma < 0.0 {
        anyhow::bail!("gamma must be a non-negative fraction (got {})", raw.gamma);
    }

    Ok(Profile {
        time,
        settings: raw.into(),
    })
}
