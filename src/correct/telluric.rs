use log::{debug, info, warn};
use rayon::prelude::*;
use thiserror::Error;

use super::xcorr::{self, XCorrError};
use crate::config::{AmplitudeGrid, CorrectionConfig};
use crate::data::model::Spectrum;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelluricError {
    #[error("no calibration spectra were given")]
    NoCalibration,

    #[error("calibration {index} has {found} samples, the spectrum has {expected}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("unusable amplitude grid [{lower}, {upper}] with {steps} steps")]
    InvalidAmplitudeGrid { lower: f64, upper: f64, steps: usize },

    #[error(transparent)]
    XCorr(#[from] XCorrError),
}

/// Best fit of one calibration spectrum against the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateFit {
    /// Position of the calibration in the input list.
    pub index: usize,
    /// Pixel shift from the cross-correlation: target pixel `i` is divided
    /// by calibration pixel `i + shift`.
    pub shift: isize,
    /// Exponent applied to the calibration.
    pub amplitude: f64,
    /// RMS deviation from 1.0 of the corrected overlap.
    pub rms: f64,
    /// Target pixels `[start, end)` the correction touches.
    pub overlap: (usize, usize),
}

/// What a correction did, beside the corrected spectrum itself.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutcome {
    /// The calibration that was divided out.
    pub best: CandidateFit,
    /// Every candidate, in input order.
    pub candidates: Vec<CandidateFit>,
}

/// Removes telluric absorption using a set of calibration spectra.
///
/// Spectra are expected to be continuum-normalised and pixel-registered
/// to the same instrument (equal sample counts); neither is checked beyond
/// the count.
#[derive(Debug, Clone, Default)]
pub struct TelluricCorrector {
    config: CorrectionConfig,
}

impl TelluricCorrector {
    pub fn new(lag: usize, amplitude: AmplitudeGrid) -> Self {
        Self::with_config(CorrectionConfig {
            lag,
            amplitude,
            ..CorrectionConfig::default()
        })
    }

    pub fn with_config(config: CorrectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    /// Correct `spectrum` with the best fitting of `calibrations`.
    pub fn correct(
        &self,
        spectrum: &Spectrum,
        calibrations: &[Spectrum],
    ) -> Result<Spectrum, TelluricError> {
        self.correct_detailed(spectrum, calibrations)
            .map(|(corrected, _)| corrected)
    }

    /// Like [`correct`](Self::correct), also reporting every candidate fit.
    pub fn correct_detailed(
        &self,
        spectrum: &Spectrum,
        calibrations: &[Spectrum],
    ) -> Result<(Spectrum, CorrectionOutcome), TelluricError> {
        if calibrations.is_empty() {
            return Err(TelluricError::NoCalibration);
        }
        let expected = spectrum.len();
        if let Some((index, cal)) = calibrations
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != expected)
        {
            return Err(TelluricError::LengthMismatch {
                index,
                expected,
                found: cal.len(),
            });
        }
        let grid = self.config.amplitude;
        let amplitudes = grid.values().ok_or(TelluricError::InvalidAmplitudeGrid {
            lower: grid.lower,
            upper: grid.upper,
            steps: grid.steps,
        })?;

        let target = spectrum.data();
        let lag = self.config.lag;
        let fit = |(index, cal): (usize, &Spectrum)| {
            fit_candidate(index, target, cal.data(), lag, &amplitudes)
        };
        let candidates: Vec<CandidateFit> = if self.config.parallel {
            calibrations
                .par_iter()
                .enumerate()
                .map(fit)
                .collect::<Result<_, _>>()?
        } else {
            calibrations
                .iter()
                .enumerate()
                .map(fit)
                .collect::<Result<_, _>>()?
        };

        let best = select_best(&candidates).ok_or(TelluricError::NoCalibration)?;
        info!(
            "telluric correction: calibration {} of {} (shift {}, amplitude {:.3}, rms {:.5})",
            best.index,
            candidates.len(),
            best.shift,
            best.amplitude,
            best.rms
        );

        let corrected = apply(target, calibrations[best.index].data(), &best);
        Ok((
            spectrum.with_data(corrected),
            CorrectionOutcome { best, candidates },
        ))
    }
}

/// Correct with the given lag and amplitude grid, reporting only the
/// corrected spectrum.
pub fn correct(
    spectrum: &Spectrum,
    calibrations: &[Spectrum],
    lag: usize,
    amplitude: AmplitudeGrid,
) -> Result<Spectrum, TelluricError> {
    TelluricCorrector::new(lag, amplitude).correct(spectrum, calibrations)
}

/// Cross-correlate, then scan the amplitude grid over the overlap.
fn fit_candidate(
    index: usize,
    target: &[f64],
    cal: &[f64],
    lag: usize,
    amplitudes: &[f64],
) -> Result<CandidateFit, XCorrError> {
    let shift = xcorr::search(target, cal, lag)?;
    // |shift| < len, so the overlap is never empty for a non-empty target.
    let (start, end) = xcorr::overlap(target.len(), shift).unwrap_or((0, 0));
    let offset = (start as isize + shift) as usize;
    let t = &target[start..end];
    let c = &cal[offset..offset + (end - start)];

    let mut best: Option<(f64, f64)> = None;
    for &k in amplitudes {
        let rms = continuum_rms(t, c, k);
        if rms.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, score)| rms < score) {
            best = Some((k, rms));
        }
    }

    let (amplitude, rms) = best.unwrap_or_else(|| {
        warn!("calibration {index}: no finite residual on the amplitude grid");
        (amplitudes[0], f64::INFINITY)
    });
    debug!("calibration {index}: shift {shift}, amplitude {amplitude:.3}, rms {rms:.6}");

    Ok(CandidateFit {
        index,
        shift,
        amplitude,
        rms,
        overlap: (start, end),
    })
}

/// RMS of `t / c^k - 1`.
fn continuum_rms(t: &[f64], c: &[f64], k: f64) -> f64 {
    if t.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = t
        .iter()
        .zip(c)
        .map(|(&ti, &ci)| (ti / ci.powf(k) - 1.0).powi(2))
        .sum();
    (sum / t.len() as f64).sqrt()
}

/// Lowest RMS wins; equal scores keep the earlier calibration.
fn select_best(candidates: &[CandidateFit]) -> Option<CandidateFit> {
    candidates
        .iter()
        .copied()
        .reduce(|best, c| if c.rms < best.rms { c } else { best })
}

/// Divide the overlap of `target` by the shifted, scaled calibration.
fn apply(target: &[f64], cal: &[f64], fit: &CandidateFit) -> Vec<f64> {
    let mut out = target.to_vec();
    let (start, end) = fit.overlap;
    for i in start..end {
        let j = (i as isize + fit.shift) as usize;
        out[i] = target[i] / cal[j].powf(fit.amplitude);
    }
    out
}
