use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::grid::linspace;
use crate::data::resample::Interpolation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config value '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings of the telluric correction and of resampling.
///
/// Every field has a default, so an empty JSON object `{}` is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorrectionConfig {
    /// Largest pixel shift tried by the cross-correlation.
    pub lag: usize,
    /// Amplitude scale factors tried for each calibration.
    pub amplitude: AmplitudeGrid,
    /// Scheme used when spectra are resampled.
    pub interpolation: Interpolation,
    /// Fit the calibration candidates on the rayon pool.
    pub parallel: bool,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            lag: 25,
            amplitude: AmplitudeGrid::default(),
            interpolation: Interpolation::Linear,
            parallel: true,
        }
    }
}

/// `steps` evenly spaced exponents over `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AmplitudeGrid {
    pub lower: f64,
    pub upper: f64,
    pub steps: usize,
}

impl Default for AmplitudeGrid {
    fn default() -> Self {
        Self {
            lower: 0.5,
            upper: 2.0,
            steps: 151,
        }
    }
}

impl AmplitudeGrid {
    pub fn new(lower: f64, upper: f64, steps: usize) -> Self {
        Self {
            lower,
            upper,
            steps,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.steps > 0
            && self.lower.is_finite()
            && self.upper.is_finite()
            && self.lower > 0.0
            && self.lower <= self.upper
    }

    /// The amplitude values, or `None` for an unusable grid.
    pub fn values(&self) -> Option<Vec<f64>> {
        if !self.is_valid() {
            return None;
        }
        linspace(self.lower, self.upper, self.steps).ok()
    }
}

impl CorrectionConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CorrectionConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.amplitude.is_valid() {
            return Err(ConfigError::Invalid {
                field: "amplitude",
                reason: format!(
                    "need 0 < lower <= upper and steps > 0, got [{}, {}] x {}",
                    self.amplitude.lower, self.amplitude.upper, self.amplitude.steps
                ),
            });
        }
        Ok(())
    }
}
