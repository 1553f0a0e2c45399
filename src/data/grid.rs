use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("grid sample count must be non-negative, got {count}")]
    NegativeCount { count: i64 },
    #[error("grid parameter '{field}' is not finite ({value})")]
    NonFinite { field: &'static str, value: f64 },
}

// ---------------------------------------------------------------------------
// LinearCalibration – the (CRPIX, CRVAL, CDELT) triple of a header
// ---------------------------------------------------------------------------

/// Header cards holding the reference pixel, reference value and step.
pub const CALIBRATION_CARDS: [&str; 3] = ["crpix1", "crval1", "cdelt1"];

/// Linear pixel → wavelength calibration.
///
/// `value[i] = reference_value + (i - reference_pixel) * step`, with `i`
/// counted from zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearCalibration {
    pub reference_pixel: f64,
    pub reference_value: f64,
    pub step: f64,
}

impl LinearCalibration {
    pub fn new(reference_pixel: f64, reference_value: f64, step: f64) -> Self {
        Self {
            reference_pixel,
            reference_value,
            step,
        }
    }

    /// Wavelength of pixel `index`.
    pub fn value_at(&self, index: usize) -> f64 {
        self.reference_value + (index as f64 - self.reference_pixel) * self.step
    }

    /// Build the `count`-sample grid.
    ///
    /// Strictly monotonic whenever `step != 0`.
    pub fn build(&self, count: i64) -> Result<Vec<f64>, GridError> {
        if count < 0 {
            return Err(GridError::NegativeCount { count });
        }
        for (field, value) in [
            ("reference_pixel", self.reference_pixel),
            ("reference_value", self.reference_value),
            ("step", self.step),
        ] {
            if !value.is_finite() {
                return Err(GridError::NonFinite { field, value });
            }
        }
        Ok((0..count as usize).map(|i| self.value_at(i)).collect())
    }
}

/// `count` evenly spaced values from `lower` to `upper`, both inclusive.
///
/// The endpoints are reproduced exactly so that a grid built from a
/// spectrum's own bounds never leaks outside its domain through rounding.
pub fn linspace(lower: f64, upper: f64, count: usize) -> Result<Vec<f64>, GridError> {
    if !lower.is_finite() {
        return Err(GridError::NonFinite {
            field: "lower",
            value: lower,
        });
    }
    if !upper.is_finite() {
        return Err(GridError::NonFinite {
            field: "upper",
            value: upper,
        });
    }
    let values = match count {
        0 => Vec::new(),
        1 => vec![lower],
        n => {
            let step = (upper - lower) / (n - 1) as f64;
            let mut v: Vec<f64> = (0..n).map(|i| lower + i as f64 * step).collect();
            v[n - 1] = upper;
            v
        }
    };
    Ok(values)
}
