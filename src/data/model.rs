use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};

use thiserror::Error;

use super::grid::{linspace, GridError, LinearCalibration, CALIBRATION_CARDS};
use super::resample::{resample, Interpolation, ResampleError};
use super::units::{DataUnit, Quantity, WaveUnit};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectrumError {
    #[error("a spectrum needs at least one sample")]
    Empty,

    #[error("data has {data} samples but wave has {wave}")]
    LengthMismatch { data: usize, wave: usize },

    #[error("wave must be finite and strictly increasing (violated at index {index})")]
    NotMonotonic { index: usize },

    #[error("invalid wavelength range [{lower}, {upper}]")]
    InvalidRange { lower: f64, upper: f64 },

    #[error("line window bounds must be finite and strictly increasing, got {bounds:?}")]
    InvalidWindow { bounds: [f64; 4] },

    #[error("kernel bandwidth must be finite and positive, got {bandwidth}")]
    InvalidBandwidth { bandwidth: f64 },

    #[error("cannot {op} operands in '{left}' and '{right}'")]
    Unit {
        op: Op,
        left: DataUnit,
        right: DataUnit,
    },

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("resampling the {operand} failed: {source}")]
    Resample {
        operand: &'static str,
        source: ResampleError,
    },
}

// ---------------------------------------------------------------------------
// HeaderValue – a single header card
// ---------------------------------------------------------------------------

/// A dynamically-typed header value as delivered by the file collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::String(s) => write!(f, "{s}"),
            HeaderValue::Integer(i) => write!(f, "{i}"),
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::Bool(b) => write!(f, "{b}"),
            HeaderValue::Null => write!(f, "<null>"),
        }
    }
}

impl HeaderValue {
    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Integer(i) => Some(*i as f64),
            HeaderValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Arithmetic operands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
        }
    }

    /// Unit of `left <op> right`, or `None` when the units are incompatible.
    fn result_unit(self, left: &DataUnit, right: &DataUnit) -> Option<DataUnit> {
        match self {
            Op::Add | Op::Sub => (left == right).then(|| left.clone()),
            Op::Mul => Some(left.multiply(right)),
            Op::Div => Some(left.divide(right)),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Add => "add",
            Op::Sub => "subtract",
            Op::Mul => "multiply",
            Op::Div => "divide",
        };
        write!(f, "{s}")
    }
}

/// Right-hand side of a spectrum arithmetic operation.
#[derive(Debug, Clone)]
pub enum Operand<'a> {
    /// Plain number, applied to every sample regardless of unit.
    Scalar(f64),
    /// Unit-tagged number.
    Quantity(Quantity),
    /// Another spectrum, resampled onto the left operand's grid first.
    Spectrum(&'a Spectrum),
}

impl From<f64> for Operand<'_> {
    fn from(v: f64) -> Self {
        Operand::Scalar(v)
    }
}

impl From<Quantity> for Operand<'_> {
    fn from(q: Quantity) -> Self {
        Operand::Quantity(q)
    }
}

impl<'a> From<&'a Spectrum> for Operand<'a> {
    fn from(s: &'a Spectrum) -> Self {
        Operand::Spectrum(s)
    }
}

// ---------------------------------------------------------------------------
// Spectrum
// ---------------------------------------------------------------------------

/// A calibrated 1-D spectrum: `data` samples at strictly increasing `wave`.
///
/// Both vectors always have the same, non-zero length.
#[derive(Debug, Clone)]
pub struct Spectrum {
    data: Vec<f64>,
    wave: Vec<f64>,
    data_unit: Option<DataUnit>,
    wave_unit: Option<WaveUnit>,
    interpolation: Interpolation,
    /// Header cards carried along from the source file (ra, dec, jd, ...).
    pub header: BTreeMap<String, HeaderValue>,
}

impl Spectrum {
    /// Build a spectrum from matching data and wavelength arrays.
    pub fn new(data: Vec<f64>, wave: Vec<f64>) -> Result<Self, SpectrumError> {
        if data.len() != wave.len() {
            return Err(SpectrumError::LengthMismatch {
                data: data.len(),
                wave: wave.len(),
            });
        }
        if data.is_empty() {
            return Err(SpectrumError::Empty);
        }
        if let Some(index) = wave.iter().position(|w| !w.is_finite()) {
            return Err(SpectrumError::NotMonotonic { index });
        }
        if let Some(i) = wave.windows(2).position(|w| w[1] <= w[0]) {
            return Err(SpectrumError::NotMonotonic { index: i + 1 });
        }
        Ok(Self {
            data,
            wave,
            data_unit: None,
            wave_unit: None,
            interpolation: Interpolation::default(),
            header: BTreeMap::new(),
        })
    }

    /// Build a spectrum whose wavelengths come from a linear calibration.
    ///
    /// A negative step yields a descending grid; both arrays are then
    /// reversed so the wavelengths increase.
    pub fn from_calibration(
        mut data: Vec<f64>,
        calibration: &LinearCalibration,
    ) -> Result<Self, SpectrumError> {
        let mut wave = calibration.build(data.len() as i64)?;
        if calibration.step < 0.0 {
            wave.reverse();
            data.reverse();
        }
        Self::new(data, wave)
    }

    /// Attach units that are not yet present. Units already set are kept.
    pub fn with_units(mut self, wave_unit: WaveUnit, data_unit: impl Into<DataUnit>) -> Self {
        self.attach_wave_unit(wave_unit);
        self.attach_data_unit(data_unit);
        self
    }

    /// Set the wave unit if none is attached yet.
    pub fn attach_wave_unit(&mut self, unit: WaveUnit) {
        self.wave_unit.get_or_insert(unit);
    }

    /// Set the data unit if none is attached yet.
    pub fn attach_data_unit(&mut self, unit: impl Into<DataUnit>) {
        self.data_unit.get_or_insert_with(|| unit.into());
    }

    pub fn with_header(mut self, header: BTreeMap<String, HeaderValue>) -> Self {
        self.header = header;
        self
    }

    pub fn set_interpolation(&mut self, kind: Interpolation) {
        self.interpolation = kind;
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn wave(&self) -> &[f64] {
        &self.wave
    }

    /// Unit of `wave`; Angstrom until set otherwise.
    pub fn wave_unit(&self) -> WaveUnit {
        self.wave_unit.unwrap_or_default()
    }

    /// Unit of `data`; dimensionless until set otherwise.
    pub fn data_unit(&self) -> DataUnit {
        self.data_unit.clone().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `(min, max)` wavelength covered.
    pub fn domain(&self) -> (f64, f64) {
        (self.wave[0], self.wave[self.wave.len() - 1])
    }

    /// Independent deep copy.
    pub fn copy(&self) -> Spectrum {
        self.clone()
    }

    /// Replace the data vector, keeping wave, units and header.
    /// Used by the correction pipeline, which never changes the grid.
    pub(crate) fn with_data(&self, data: Vec<f64>) -> Spectrum {
        debug_assert_eq!(data.len(), self.wave.len());
        Spectrum {
            data,
            ..self.clone()
        }
    }

    // -- header accessors for velocity corrections --

    fn header_f64(&self, key: &str) -> Option<f64> {
        self.header
            .get(key)
            .or_else(|| self.header.get(&key.to_ascii_uppercase()))
            .and_then(HeaderValue::as_f64)
    }

    /// Right ascension, when the header carries one.
    pub fn ra(&self) -> Option<f64> {
        self.header_f64("ra")
    }

    /// Declination, when the header carries one.
    pub fn dec(&self) -> Option<f64> {
        self.header_f64("dec")
    }

    /// Julian date of the observation, when the header carries one.
    pub fn jd(&self) -> Option<f64> {
        self.header_f64("jd")
    }

    // -- resampling --

    /// `other`'s wavelengths expressed in this spectrum's wave unit.
    fn grid_of(&self, other: &Spectrum) -> Vec<f64> {
        other.wave_unit().convert(&other.wave, self.wave_unit())
    }

    fn interpolate(&self, target: &[f64], operand: &'static str) -> Result<Vec<f64>, SpectrumError> {
        resample(&self.wave, &self.data, target, self.interpolation)
            .map_err(|source| SpectrumError::Resample { operand, source })
    }

    /// Move this spectrum onto `other`'s wavelength grid, in place.
    pub fn resample_onto(&mut self, other: &Spectrum) -> Result<(), SpectrumError> {
        let target = self.grid_of(other);
        self.data = self.interpolate(&target, "spectrum")?;
        self.replace_grid(target);
        Ok(())
    }

    /// Move this spectrum onto `count` evenly spaced wavelengths spanning
    /// `[lower, upper]`, in place.
    pub fn resample_to(&mut self, lower: f64, upper: f64, count: usize) -> Result<(), SpectrumError> {
        if !(lower <= upper) || count == 0 || (count > 1 && lower == upper) {
            return Err(SpectrumError::InvalidRange { lower, upper });
        }
        let target = linspace(lower, upper, count)?;
        self.data = self.interpolate(&target, "spectrum")?;
        self.replace_grid(target);
        Ok(())
    }

    /// Install a new wavelength grid. Calibration cards describe the old
    /// grid, so they are dropped.
    fn replace_grid(&mut self, wave: Vec<f64>) {
        self.wave = wave;
        for card in CALIBRATION_CARDS {
            self.header.remove(card);
            self.header.remove(&card.to_ascii_uppercase());
        }
    }

    /// Copy of this spectrum on `other`'s grid.
    pub fn resampled_onto(&self, other: &Spectrum) -> Result<Spectrum, SpectrumError> {
        let mut out = self.copy();
        out.resample_onto(other)?;
        Ok(out)
    }

    /// Sub-spectrum of the samples strictly inside `(lower, upper)`.
    pub fn slice(&self, lower: f64, upper: f64) -> Result<Spectrum, SpectrumError> {
        if !(lower < upper) {
            return Err(SpectrumError::InvalidRange { lower, upper });
        }
        let start = self.wave.partition_point(|&w| w <= lower);
        let end = self.wave.partition_point(|&w| w < upper);
        if start >= end {
            return Err(SpectrumError::Empty);
        }
        Ok(Spectrum {
            data: self.data[start..end].to_vec(),
            wave: self.wave[start..end].to_vec(),
            ..self.clone()
        })
    }

    // -- arithmetic --

    /// Compute `self <op> rhs` without touching either operand.
    fn evaluate<'a>(
        &self,
        op: Op,
        rhs: impl Into<Operand<'a>>,
    ) -> Result<(Vec<f64>, DataUnit), SpectrumError> {
        let left = self.data_unit();
        match rhs.into() {
            Operand::Scalar(v) => Ok((self.data.iter().map(|&a| op.apply(a, v)).collect(), left)),
            Operand::Quantity(q) => {
                let unit = op.result_unit(&left, &q.unit).ok_or_else(|| SpectrumError::Unit {
                    op,
                    left: left.clone(),
                    right: q.unit.clone(),
                })?;
                let data = self.data.iter().map(|&a| op.apply(a, q.value)).collect();
                Ok((data, unit))
            }
            Operand::Spectrum(other) => {
                let right = other.data_unit();
                let unit = op
                    .result_unit(&left, &right)
                    .ok_or_else(|| SpectrumError::Unit {
                        op,
                        left: left.clone(),
                        right: right.clone(),
                    })?;
                let aligned = other.interpolate(&other.grid_of(self), "right-hand operand")?;
                let data = self
                    .data
                    .iter()
                    .zip(aligned.iter())
                    .map(|(&a, &b)| op.apply(a, b))
                    .collect();
                Ok((data, unit))
            }
        }
    }

    /// New spectrum holding `self <op> rhs` on this spectrum's grid.
    pub fn combined<'a>(&self, op: Op, rhs: impl Into<Operand<'a>>) -> Result<Spectrum, SpectrumError> {
        let (data, unit) = self.evaluate(op, rhs)?;
        let mut out = self.with_data(data);
        out.data_unit = Some(unit);
        Ok(out)
    }

    /// Apply `self <op>= rhs`. On error `self` is left untouched.
    pub fn combine_in_place<'a>(
        &mut self,
        op: Op,
        rhs: impl Into<Operand<'a>>,
    ) -> Result<(), SpectrumError> {
        let (data, unit) = self.evaluate(op, rhs)?;
        self.data = data;
        self.data_unit = Some(unit);
        Ok(())
    }

    pub fn added_to<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Spectrum, SpectrumError> {
        self.combined(Op::Add, rhs)
    }

    pub fn subtracted<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Spectrum, SpectrumError> {
        self.combined(Op::Sub, rhs)
    }

    pub fn multiplied<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Spectrum, SpectrumError> {
        self.combined(Op::Mul, rhs)
    }

    pub fn divided<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Spectrum, SpectrumError> {
        self.combined(Op::Div, rhs)
    }

    pub fn add_in_place<'a>(&mut self, rhs: impl Into<Operand<'a>>) -> Result<(), SpectrumError> {
        self.combine_in_place(Op::Add, rhs)
    }

    pub fn sub_in_place<'a>(&mut self, rhs: impl Into<Operand<'a>>) -> Result<(), SpectrumError> {
        self.combine_in_place(Op::Sub, rhs)
    }

    pub fn mul_in_place<'a>(&mut self, rhs: impl Into<Operand<'a>>) -> Result<(), SpectrumError> {
        self.combine_in_place(Op::Mul, rhs)
    }

    pub fn div_in_place<'a>(&mut self, rhs: impl Into<Operand<'a>>) -> Result<(), SpectrumError> {
        self.combine_in_place(Op::Div, rhs)
    }

    fn map_scalar(mut self, op: Op, v: f64) -> Spectrum {
        self.data.iter_mut().for_each(|a| *a = op.apply(*a, v));
        self
    }
}

// Plain scalars can never fail, so they get the std operators.

impl Add<f64> for Spectrum {
    type Output = Spectrum;
    fn add(self, v: f64) -> Spectrum {
        self.map_scalar(Op::Add, v)
    }
}

impl Sub<f64> for Spectrum {
    type Output = Spectrum;
    fn sub(self, v: f64) -> Spectrum {
        self.map_scalar(Op::Sub, v)
    }
}

impl Mul<f64> for Spectrum {
    type Output = Spectrum;
    fn mul(self, v: f64) -> Spectrum {
        self.map_scalar(Op::Mul, v)
    }
}

impl Div<f64> for Spectrum {
    type Output = Spectrum;
    fn div(self, v: f64) -> Spectrum {
        self.map_scalar(Op::Div, v)
    }
}

impl AddAssign<f64> for Spectrum {
    fn add_assign(&mut self, v: f64) {
        self.data.iter_mut().for_each(|a| *a += v);
    }
}

impl SubAssign<f64> for Spectrum {
    fn sub_assign(&mut self, v: f64) {
        self.data.iter_mut().for_each(|a| *a -= v);
    }
}

impl MulAssign<f64> for Spectrum {
    fn mul_assign(&mut self, v: f64) {
        self.data.iter_mut().for_each(|a| *a *= v);
    }
}

impl DivAssign<f64> for Spectrum {
    fn div_assign(&mut self, v: f64) {
        self.data.iter_mut().for_each(|a| *a /= v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::units::FluxUnit;
    use approx::assert_relative_eq;

    fn ramp() -> Spectrum {
        Spectrum::new(
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![4000.0, 4001.0, 4002.0, 4003.0, 4004.0],
        )
        .unwrap()
    }

    #[test]
    fn construction_validates_shape_and_order() {
        assert_eq!(
            Spectrum::new(vec![1.0, 2.0], vec![1.0]).unwrap_err(),
            SpectrumError::LengthMismatch { data: 2, wave: 1 }
        );
        assert_eq!(
            Spectrum::new(vec![], vec![]).unwrap_err(),
            SpectrumError::Empty
        );
        assert_eq!(
            Spectrum::new(vec![1.0; 3], vec![1.0, 2.0, 2.0]).unwrap_err(),
            SpectrumError::NotMonotonic { index: 2 }
        );
    }

    #[test]
    fn from_calibration_builds_grid() {
        let cal = LinearCalibration::new(0.0, 4000.0, 1.0);
        let s = Spectrum::from_calibration(vec![1.0, 2.0, 3.0], &cal).unwrap();
        assert_eq!(s.wave(), &[4000.0, 4001.0, 4002.0]);
    }

    #[test]
    fn from_calibration_with_negative_step_is_reordered() {
        let cal = LinearCalibration::new(0.0, 4002.0, -1.0);
        let s = Spectrum::from_calibration(vec![1.0, 2.0, 3.0], &cal).unwrap();
        assert_eq!(s.wave(), &[4000.0, 4001.0, 4002.0]);
        assert_eq!(s.data(), &[3.0, 2.0, 1.0]);
    }

    #[test]
    fn with_units_does_not_override() {
        let s = ramp()
            .with_units(WaveUnit::Nanometer, FluxUnit::Counts)
            .with_units(WaveUnit::Angstrom, FluxUnit::Adu);
        assert_eq!(s.wave_unit(), WaveUnit::Nanometer);
        assert_eq!(s.data_unit(), DataUnit::from(FluxUnit::Counts));
    }

    #[test]
    fn resample_to_explicit_grid() {
        let mut s = ramp();
        s.resample_to(4001.0, 4003.0, 3).unwrap();
        assert_eq!(s.wave(), &[4001.0, 4002.0, 4003.0]);
        for (got, want) in s.data().iter().zip([2.0, 3.0, 4.0]) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn resample_to_rejects_bad_range_and_extrapolation() {
        let mut s = ramp();
        assert!(matches!(
            s.resample_to(4003.0, 4001.0, 3),
            Err(SpectrumError::InvalidRange { .. })
        ));
        assert!(matches!(
            s.resample_to(3990.0, 4003.0, 3),
            Err(SpectrumError::Resample {
                source: ResampleError::Domain { .. },
                ..
            })
        ));
        // failed calls leave the spectrum untouched
        assert_eq!(s.data(), ramp().data());
    }

    #[test]
    fn resample_onto_converts_wave_units() {
        let mut s = ramp().with_units(WaveUnit::Angstrom, DataUnit::dimensionless());
        let other = Spectrum::new(vec![0.0; 2], vec![400.1, 400.3])
            .unwrap()
            .with_units(WaveUnit::Nanometer, DataUnit::dimensionless());
        s.resample_onto(&other).unwrap();
        assert_relative_eq!(s.wave()[0], 4001.0, epsilon = 1e-9);
        assert_relative_eq!(s.data()[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(s.data()[1], 4.0, epsilon = 1e-9);
        assert_eq!(s.wave_unit(), WaveUnit::Angstrom);
    }

    #[test]
    fn quantity_addition_requires_matching_units() {
        let s = ramp().with_units(WaveUnit::Angstrom, FluxUnit::Counts);
        let ok = s.added_to(Quantity::new(1.0, FluxUnit::Counts)).unwrap();
        assert_eq!(ok.data()[0], 2.0);

        let err = s.added_to(Quantity::new(1.0, FluxUnit::Jansky)).unwrap_err();
        assert!(matches!(err, SpectrumError::Unit { op: Op::Add, .. }));
    }

    #[test]
    fn quantity_division_changes_unit() {
        let s = ramp().with_units(WaveUnit::Angstrom, FluxUnit::Counts);
        let rate = s.divided(Quantity::new(2.0, FluxUnit::Second)).unwrap();
        assert_eq!(rate.data()[1], 1.0);
        assert_eq!(rate.data_unit().power_of(FluxUnit::Second), -1);
        assert_eq!(rate.data_unit().power_of(FluxUnit::Counts), 1);
    }

    #[test]
    fn std_operators_for_plain_scalars() {
        let s = ramp() * 2.0 + 1.0;
        assert_eq!(s.data(), &[3.0, 5.0, 7.0, 9.0, 11.0]);
        let mut t = ramp();
        t -= 1.0;
        t /= 2.0;
        assert_eq!(t.data(), &[0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn slice_keeps_strict_interior() {
        let s = ramp().slice(4000.0, 4003.0).unwrap();
        assert_eq!(s.wave(), &[4001.0, 4002.0]);
        assert_eq!(s.data(), &[2.0, 3.0]);
        assert_eq!(ramp().slice(4000.2, 4000.8).unwrap_err(), SpectrumError::Empty);
    }

    #[test]
    fn resampling_drops_calibration_cards() {
        let mut header = BTreeMap::new();
        header.insert("crpix1".to_string(), HeaderValue::Float(0.0));
        header.insert("CRVAL1".to_string(), HeaderValue::Float(4000.0));
        header.insert("cdelt1".to_string(), HeaderValue::Float(1.0));
        header.insert("jd".to_string(), HeaderValue::Float(2457000.5));
        let mut s = ramp().with_header(header);

        assert!(s.resample_to(4003.0, 4001.0, 3).is_err());
        assert_eq!(s.header.len(), 4, "failed resample keeps the header");

        s.resample_to(4001.0, 4003.0, 5).unwrap();
        assert_eq!(s.header.keys().collect::<Vec<_>>(), vec!["jd"]);

        let mut t = ramp();
        t.header.insert("cdelt1".to_string(), HeaderValue::Float(1.0));
        t.resample_onto(&s).unwrap();
        assert!(t.header.is_empty());
    }

    #[test]
    fn header_values_cover_loader_types() {
        let values = [
            HeaderValue::String("12.5".to_string()),
            HeaderValue::Integer(3),
            HeaderValue::Float(0.5),
            HeaderValue::Bool(true),
            HeaderValue::Null,
        ];
        for value in &values {
            let expected = match value {
                HeaderValue::String(_) => Some(12.5),
                HeaderValue::Integer(_) => Some(3.0),
                HeaderValue::Float(_) => Some(0.5),
                HeaderValue::Bool(_) | HeaderValue::Null => None,
            };
            assert_eq!(value.as_f64(), expected, "{value}");
        }
    }

    #[test]
    fn header_accessors() {
        let mut header = BTreeMap::new();
        header.insert("RA".to_string(), HeaderValue::Float(83.82));
        header.insert("dec".to_string(), HeaderValue::String("-5.39".to_string()));
        header.insert("jd".to_string(), HeaderValue::Integer(2457000));
        let s = ramp().with_header(header);
        assert_eq!(s.ra(), Some(83.82));
        assert_eq!(s.dec(), Some(-5.39));
        assert_eq!(s.jd(), Some(2457000.0));
    }
}
