use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResampleError {
    #[error("cannot resample {what}: it is empty")]
    Empty { what: &'static str },

    #[error("source wave has {wave} samples but data has {data}")]
    LengthMismatch { wave: usize, data: usize },

    #[error("{what} is not monotonic at index {index}")]
    NotMonotonic { what: &'static str, index: usize },

    /// The target range is not contained in the source range.
    #[error(
        "target domain [{target_min}, {target_max}] exceeds source domain \
         [{source_min}, {source_max}]; extrapolation is not permitted"
    )]
    Domain {
        target_min: f64,
        target_max: f64,
        source_min: f64,
        source_max: f64,
    },
}

// ---------------------------------------------------------------------------
// Interpolation kinds
// ---------------------------------------------------------------------------

/// Interpolation scheme used when moving data onto a new wavelength grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Piecewise-linear between neighbouring samples.
    #[default]
    Linear,
    /// Value of the closest sample (lower one on exact midpoints).
    Nearest,
    /// Natural cubic spline through all samples.
    CubicSpline,
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Evaluate the interpolant through `(wave, data)` at every point of `target`.
///
/// `wave` must be strictly increasing. `target` may run in either
/// direction but must be monotonic, and its range must lie inside
/// `[wave[0], wave[n-1]]`.
pub fn resample(
    wave: &[f64],
    data: &[f64],
    target: &[f64],
    kind: Interpolation,
) -> Result<Vec<f64>, ResampleError> {
    if wave.len() != data.len() {
        return Err(ResampleError::LengthMismatch {
            wave: wave.len(),
            data: data.len(),
        });
    }
    if wave.is_empty() {
        return Err(ResampleError::Empty { what: "source" });
    }
    if target.is_empty() {
        return Err(ResampleError::Empty { what: "target grid" });
    }
    if let Some(index) = first_non_increasing(wave) {
        return Err(ResampleError::NotMonotonic {
            what: "source wave",
            index,
        });
    }
    let (target_min, target_max) = target_bounds(target)?;
    let (source_min, source_max) = (wave[0], wave[wave.len() - 1]);
    if target_min < source_min || target_max > source_max {
        return Err(ResampleError::Domain {
            target_min,
            target_max,
            source_min,
            source_max,
        });
    }

    if wave.len() == 1 {
        // Containment forces every target point onto the single sample.
        return Ok(vec![data[0]; target.len()]);
    }

    let values = match kind {
        Interpolation::Linear => target.iter().map(|&x| linear_at(wave, data, x)).collect(),
        Interpolation::Nearest => target.iter().map(|&x| nearest_at(wave, data, x)).collect(),
        Interpolation::CubicSpline => {
            let spline = NaturalSpline::new(wave, data);
            target.iter().map(|&x| spline.evaluate(x)).collect()
        }
    };
    Ok(values)
}

fn first_non_increasing(wave: &[f64]) -> Option<usize> {
    if let Some(i) = wave.iter().position(|w| !w.is_finite()) {
        return Some(i);
    }
    wave.windows(2).position(|w| w[1] <= w[0]).map(|i| i + 1)
}

/// Min/max of a monotonic target grid (either direction).
fn target_bounds(target: &[f64]) -> Result<(f64, f64), ResampleError> {
    if let Some(index) = target.iter().position(|t| !t.is_finite()) {
        return Err(ResampleError::NotMonotonic {
            what: "target grid",
            index,
        });
    }
    let first = target[0];
    let last = target[target.len() - 1];
    let ascending = last >= first;
    let bad = target.windows(2).position(|w| {
        if ascending {
            w[1] < w[0]
        } else {
            w[1] > w[0]
        }
    });
    if let Some(i) = bad {
        return Err(ResampleError::NotMonotonic {
            what: "target grid",
            index: i + 1,
        });
    }
    Ok(if ascending { (first, last) } else { (last, first) })
}

/// Index `j` of the segment `[wave[j], wave[j+1]]` containing `x`.
fn segment(wave: &[f64], x: f64) -> usize {
    let upper = wave.partition_point(|&w| w <= x);
    upper.saturating_sub(1).min(wave.len() - 2)
}

fn linear_at(wave: &[f64], data: &[f64], x: f64) -> f64 {
    let j = segment(wave, x);
    if x == wave[j] {
        return data[j];
    }
    let t = (x - wave[j]) / (wave[j + 1] - wave[j]);
    data[j] + t * (data[j + 1] - data[j])
}

fn nearest_at(wave: &[f64], data: &[f64], x: f64) -> f64 {
    let j = segment(wave, x);
    if x - wave[j] <= wave[j + 1] - x {
        data[j]
    } else {
        data[j + 1]
    }
}

// ---------------------------------------------------------------------------
// Natural cubic spline
// ---------------------------------------------------------------------------

/// Piecewise cubics `a + b·dx + c·dx² + d·dx³` with zero second
/// derivative at both ends.
struct NaturalSpline<'a> {
    wave: &'a [f64],
    coeffs: Vec<[f64; 4]>,
}

impl<'a> NaturalSpline<'a> {
    fn new(wave: &'a [f64], data: &[f64]) -> Self {
        let n = wave.len();
        let h: Vec<f64> = wave.windows(2).map(|w| w[1] - w[0]).collect();

        let mut alpha = vec![0.0; n];
        for i in 1..n - 1 {
            alpha[i] = 3.0 / h[i] * (data[i + 1] - data[i])
                - 3.0 / h[i - 1] * (data[i] - data[i - 1]);
        }

        // Thomas algorithm on the tridiagonal system for c.
        let mut l = vec![1.0; n];
        let mut mu = vec![0.0; n];
        let mut z = vec![0.0; n];
        for i in 1..n - 1 {
            l[i] = 2.0 * (wave[i + 1] - wave[i - 1]) - h[i - 1] * mu[i - 1];
            mu[i] = h[i] / l[i];
            z[i] = (alpha[i] - h[i - 1] * z[i - 1]) / l[i];
        }

        let mut c = vec![0.0; n];
        let mut coeffs = vec![[0.0; 4]; n - 1];
        for j in (0..n - 1).rev() {
            c[j] = z[j] - mu[j] * c[j + 1];
            let b = (data[j + 1] - data[j]) / h[j] - h[j] * (c[j + 1] + 2.0 * c[j]) / 3.0;
            let d = (c[j + 1] - c[j]) / (3.0 * h[j]);
            coeffs[j] = [data[j], b, c[j], d];
        }

        Self { wave, coeffs }
    }

    fn evaluate(&self, x: f64) -> f64 {
        let j = segment(self.wave, x);
        let [a, b, c, d] = self.coeffs[j];
        let dx = x - self.wave[j];
        a + dx * (b + dx * (c + dx * d))
    }
}
