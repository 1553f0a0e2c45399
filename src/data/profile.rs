use log::debug;

use super::model::{Spectrum, SpectrumError};
use super::resample::{resample, Interpolation};
use super::units::WaveUnit;

/// Kernel bandwidth used by [`Spectrum::extract_line`], in Angstrom.
pub const DEFAULT_BANDWIDTH_ANGSTROM: f64 = 1.0;

/// A spectral line cut out of its surroundings, with the continuum
/// modelled underneath it.
#[derive(Debug, Clone)]
pub struct LineProfile {
    /// Samples strictly inside the line bounds.
    pub line: Spectrum,
    /// Continuum model over the whole outer window, gap included.
    pub continuum: Spectrum,
    /// RMS of the observed continuum samples about the model.
    pub continuum_rms: f64,
    /// Per-sample uncertainty of `line`, scaled from `continuum_rms`.
    pub line_rms: Vec<f64>,
}

impl Spectrum {
    /// Extract the line between `bounds[1]` and `bounds[2]`, modelling the
    /// continuum from the samples in `(bounds[0], bounds[1])` and
    /// `(bounds[2], bounds[3])`.
    ///
    /// The continuum samples are kernel-smoothed with a Gaussian of
    /// [`DEFAULT_BANDWIDTH_ANGSTROM`], then interpolated across the line
    /// with `kind`.
    pub fn extract_line(
        &self,
        bounds: [f64; 4],
        kind: Interpolation,
    ) -> Result<LineProfile, SpectrumError> {
        let bandwidth =
            WaveUnit::Angstrom.convert_value(DEFAULT_BANDWIDTH_ANGSTROM, self.wave_unit());
        self.extract_line_with_bandwidth(bounds, kind, bandwidth)
    }

    /// Like [`extract_line`](Self::extract_line) with an explicit kernel
    /// bandwidth, in this spectrum's wave unit.
    pub fn extract_line_with_bandwidth(
        &self,
        bounds: [f64; 4],
        kind: Interpolation,
        bandwidth: f64,
    ) -> Result<LineProfile, SpectrumError> {
        if !bounds.iter().all(|b| b.is_finite()) || !bounds.windows(2).all(|w| w[0] < w[1]) {
            return Err(SpectrumError::InvalidWindow { bounds });
        }
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(SpectrumError::InvalidBandwidth { bandwidth });
        }
        let [outer_lo, line_lo, line_hi, outer_hi] = bounds;

        let line = self.slice(line_lo, line_hi)?;
        let window = self.slice(outer_lo, outer_hi)?;

        let (cont_wave, cont_data): (Vec<f64>, Vec<f64>) = window
            .wave()
            .iter()
            .zip(window.data())
            .filter(|&(&w, _)| w < line_lo || w > line_hi)
            .map(|(&w, &d)| (w, d))
            .unzip();
        if cont_wave.is_empty() {
            return Err(SpectrumError::Empty);
        }

        let model = kernel_smooth(&cont_wave, &cont_data, bandwidth);
        let across = |target: &[f64]| {
            resample(&cont_wave, &model, target, kind)
                .map_err(|source| SpectrumError::Resample {
                    operand: "continuum",
                    source,
                })
        };
        let cont_window = across(window.wave())?;
        let cont_line = across(line.wave())?;

        let continuum_rms = (model
            .iter()
            .zip(&cont_data)
            .map(|(m, d)| (m - d).powi(2))
            .sum::<f64>()
            / cont_data.len() as f64)
            .sqrt();
        let line_rms = cont_line
            .iter()
            .zip(line.data())
            .map(|(c, l)| continuum_rms * (c / l).sqrt())
            .collect();

        debug!(
            "extracted line of {} samples over [{line_lo}, {line_hi}], continuum from {} samples, rms {continuum_rms:.3e}",
            line.len(),
            cont_wave.len()
        );

        Ok(LineProfile {
            line,
            continuum: window.with_data(cont_window),
            continuum_rms,
            line_rms,
        })
    }
}

/// Nadaraya-Watson estimate with a Gaussian kernel, evaluated at `x`.
fn kernel_smooth(x: &[f64], y: &[f64], bandwidth: f64) -> Vec<f64> {
    x.iter()
        .map(|&at| {
            let (num, den) = x.iter().zip(y).fold((0.0, 0.0), |(num, den), (&xi, &yi)| {
                let u = (at - xi) / bandwidth;
                let k = (-0.5 * u * u).exp();
                (num + k * yi, den + k)
            });
            num / den
        })
        .collect()
}
