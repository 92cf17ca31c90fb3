//! Color temperature to color-transform matrix conversion.
//!
//! The temperature curve is a blackbody approximation fitted piecewise on
//! `kelvin / 100` (Tanner Helland's model): below 6600K red is saturated and
//! green/blue follow logarithmic curves, above it red and green follow power
//! laws and blue is saturated. Channel values are clamped to `0..=255` and
//! normalized to a diagonal matrix, which is then scaled by gamma. Identity mode
//! replaces only the temperature part; gamma scaling always applies.

pub mod matrix;

use thiserror::Error;

use crate::common::constants::{MAXIMUM_TEMP, MINIMUM_TEMP};

pub use matrix::Matrix3;

/// Validation failures for color inputs. State is never mutated when one is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ColorError {
    #[error("temperature {0}K is outside the valid range 1000-20000K")]
    TemperatureOutOfRange(u32),
    #[error("gamma {gamma} is outside the valid range 0-{max}")]
    GammaOutOfRange { gamma: f32, max: f32 },
}

/// The adjustable inputs of a color state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSettings {
    pub temperature: u32,
    /// Gamma as a fraction, 1.0 is unchanged brightness.
    pub gamma: f32,
    pub identity: bool,
}

/// Compute the color-transform matrix for the given inputs.
pub fn compute(settings: &ColorSettings, max_gamma: f32) -> Result<Matrix3, ColorError> {
    validate(settings, max_gamma)?;

    let base = if settings.identity {
        Matrix3::IDENTITY
    } else {
        let (r, g, b) = temperature_to_rgb(settings.temperature);
        Matrix3::diagonal(r / 255.0, g / 255.0, b / 255.0)
    };

    let gamma = settings.gamma;
    Ok(base.multiply(&Matrix3::diagonal(gamma, gamma, gamma)))
}

fn validate(settings: &ColorSettings, max_gamma: f32) -> Result<(), ColorError> {
    if !(MINIMUM_TEMP..=MAXIMUM_TEMP).contains(&settings.temperature) {
        return Err(ColorError::TemperatureOutOfRange(settings.temperature));
    }
    // NaN fails both comparisons and is rejected as well
    if !(settings.gamma >= 0.0 && settings.gamma <= max_gamma) {
        return Err(ColorError::GammaOutOfRange {
            gamma: settings.gamma,
            max: max_gamma,
        });
    }
    Ok(())
}

/// RGB channel values in `0.0..=255.0` for a temperature in Kelvin.
fn temperature_to_rgb(kelvin: u32) -> (f32, f32, f32) {
    // Integer division is part of the fitted model
    let t = f64::from(kelvin / 100);

    let (r, g, b) = if t <= 66.0 {
        let g = 99.470_802_586_1 * t.ln() - 161.119_568_166_1;
        let b = if t <= 19.0 {
            0.0
        } else {
            138.517_731_223_1 * (t - 10.0).ln() - 305.044_792_730_7
        };
        (255.0, g, b)
    } else {
        let r = 329.698_727_446 * (t - 60.0).powf(-0.133_204_759_2);
        let g = 288.122_169_528_3 * (t - 60.0).powf(-0.075_514_849_2);
        (r, g, 255.0)
    };

    (
        r.clamp(0.0, 255.0) as f32,
        g.clamp(0.0, 255.0) as f32,
        b.clamp(0.0, 255.0) as f32,
    )
}

/// The single process-wide color state owned by the coordinator.
///
/// Every mutation goes through [`ColorState::apply`], which validates and
/// recomputes the matrix before committing anything, so `matrix` always
/// matches the stored settings.
#[derive(Debug, Clone)]
pub struct ColorState {
    settings: ColorSettings,
    max_gamma: f32,
    matrix: Matrix3,
}

impl ColorState {
    pub fn new(settings: ColorSettings, max_gamma: f32) -> Result<Self, ColorError> {
        let matrix = compute(&settings, max_gamma)?;
        Ok(Self {
            settings,
            max_gamma,
            matrix,
        })
    }

    /// Replace all settings at once. On error nothing changes.
    ///
    /// Returns whether the settings actually changed.
    pub fn apply(&mut self, settings: ColorSettings) -> Result<bool, ColorError> {
        let matrix = compute(&settings, self.max_gamma)?;
        let changed = settings != self.settings;
        self.settings = settings;
        self.matrix = matrix;
        Ok(changed)
    }

    /// Set a temperature; this also clears identity mode.
    pub fn set_temperature(&mut self, temperature: u32) -> Result<bool, ColorError> {
        self.apply(ColorSettings {
            temperature,
            identity: false,
            ..self.settings
        })
    }

    pub fn set_gamma(&mut self, gamma: f32) -> Result<bool, ColorError> {
        self.apply(ColorSettings {
            gamma,
            ..self.settings
        })
    }

    pub fn set_identity(&mut self, identity: bool) -> Result<bool, ColorError> {
        self.apply(ColorSettings {
            identity,
            ..self.settings
        })
    }

    pub fn settings(&self) -> ColorSettings {
        self.settings
    }

    pub fn temperature(&self) -> u32 {
        self.settings.temperature
    }

    pub fn gamma(&self) -> f32 {
        self.settings.gamma
    }

    pub fn identity(&self) -> bool {
        self.settings.identity
    }

    pub fn max_gamma(&self) -> f32 {
        self.max_gamma
    }

    pub fn matrix(&self) -> &Matrix3 {
        &self.matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(temperature: u32, gamma: f32, identity: bool) -> ColorSettings {
        ColorSettings {
            temperature,
            gamma,
            identity,
        }
    }

    #[test]
    fn test_identity_with_unit_gamma_is_identity_matrix() {
        let m = compute(&settings(3000, 1.0, true), 1.0).unwrap();
        assert_eq!(m, Matrix3::IDENTITY);
    }

    #[test]
    fn test_lowest_temperature_has_no_blue() {
        let m = compute(&settings(1000, 1.0, false), 1.0).unwrap();
        assert_eq!(m.at(2, 2), 0.0);
        assert_eq!(m.at(0, 0), 1.0);
        assert!(m.at(1, 1) > 0.0 && m.at(1, 1) < 1.0);
    }

    #[test]
    fn test_high_temperature_saturates_blue() {
        let m = compute(&settings(10000, 1.0, false), 1.0).unwrap();
        assert_eq!(m.at(2, 2), 1.0);
        assert!(m.at(0, 0) < 1.0);
    }

    #[test]
    fn test_daylight_is_close_to_neutral() {
        let m = compute(&settings(6500, 1.0, false), 1.0).unwrap();
        assert_eq!(m.at(0, 0), 1.0);
        assert!(m.at(1, 1) > 0.95);
        assert!(m.at(2, 2) > 0.9);
    }

    #[test]
    fn test_gamma_scales_identity() {
        let m = compute(&settings(6000, 0.5, true), 1.0).unwrap();
        assert_eq!(m, Matrix3::diagonal(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_off_diagonal_stays_zero() {
        let m = compute(&settings(4500, 0.8, false), 1.0).unwrap();
        for row in 0..3 {
            for col in 0..3 {
                if row != col {
                    assert_eq!(m.at(row, col), 0.0);
                }
            }
        }
    }

    #[test]
    fn test_rejects_out_of_range_temperature() {
        assert_eq!(
            compute(&settings(999, 1.0, false), 1.0),
            Err(ColorError::TemperatureOutOfRange(999))
        );
        assert_eq!(
            compute(&settings(20001, 1.0, false), 1.0),
            Err(ColorError::TemperatureOutOfRange(20001))
        );
    }

    #[test]
    fn test_rejects_out_of_range_gamma() {
        assert!(compute(&settings(6000, -0.01, false), 1.0).is_err());
        assert!(compute(&settings(6000, 1.01, false), 1.0).is_err());
        assert!(compute(&settings(6000, 1.5, false), 2.0).is_ok());
        assert!(compute(&settings(6000, f32::NAN, false), 1.0).is_err());
    }

    #[test]
    fn test_rejected_mutation_keeps_previous_matrix() {
        let mut state = ColorState::new(settings(4000, 0.9, false), 1.0).unwrap();
        let before = *state.matrix();

        assert!(state.set_temperature(999).is_err());
        assert!(state.set_temperature(20001).is_err());
        assert!(state.set_gamma(-0.01).is_err());
        assert!(state.set_gamma(1.2).is_err());

        assert_eq!(*state.matrix(), before);
        assert_eq!(state.settings(), settings(4000, 0.9, false));
    }

    #[test]
    fn test_set_temperature_clears_identity() {
        let mut state = ColorState::new(settings(4000, 1.0, true), 1.0).unwrap();
        assert!(state.set_temperature(5000).unwrap());
        assert!(!state.identity());
        assert_ne!(*state.matrix(), Matrix3::IDENTITY);
    }

    #[test]
    fn test_apply_reports_unchanged() {
        let mut state = ColorState::new(settings(4000, 1.0, false), 1.0).unwrap();
        assert!(!state.apply(settings(4000, 1.0, false)).unwrap());
        assert!(state.apply(settings(4100, 1.0, false)).unwrap());
    }
}
