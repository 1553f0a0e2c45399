//! Calibrated 1-D spectra: construction from linear wavelength solutions,
//! unit-aware arithmetic with implicit resampling, and telluric correction
//! driven by cross-correlation.

pub mod config;
pub mod correct;
pub mod data;

pub use config::{AmplitudeGrid, ConfigError, CorrectionConfig};
pub use correct::telluric::{CandidateFit, CorrectionOutcome, TelluricCorrector, TelluricError};
pub use correct::xcorr::XCorrError;
pub use data::grid::{GridError, LinearCalibration};
pub use data::model::{HeaderValue, Op, Operand, Spectrum, SpectrumError};
pub use data::profile::LineProfile;
pub use data::resample::{Interpolation, ResampleError};
pub use data::units::{DataUnit, FluxUnit, Quantity, WaveUnit};
