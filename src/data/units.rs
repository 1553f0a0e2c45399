use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Unit parsing errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitParseError {
    #[error("unknown wavelength unit '{0}'")]
    UnknownWave(String),
    #[error("unknown flux unit '{0}'")]
    UnknownFlux(String),
    #[error("bad exponent in unit term '{0}'")]
    BadExponent(String),
}

// ---------------------------------------------------------------------------
// WaveUnit – length unit of the wavelength axis
// ---------------------------------------------------------------------------

/// Length unit attached to a wavelength vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveUnit {
    #[default]
    Angstrom,
    Nanometer,
    Micrometer,
    Meter,
}

impl WaveUnit {
    /// Power of ten of one unit expressed in metres.
    pub fn exponent(self) -> i32 {
        match self {
            WaveUnit::Angstrom => -10,
            WaveUnit::Nanometer => -9,
            WaveUnit::Micrometer => -6,
            WaveUnit::Meter => 0,
        }
    }

    /// Multiplicative factor taking a value in `self` to a value in `to`.
    pub fn factor_to(self, to: WaveUnit) -> f64 {
        let delta = self.exponent() - to.exponent();
        if delta >= 0 {
            10f64.powi(delta)
        } else {
            1.0 / 10f64.powi(-delta)
        }
    }

    /// Express a single value given in `self` in `to`.
    ///
    /// Scales by an exact power of ten, multiplying or dividing so that the
    /// result is correctly rounded: 4001 Å is exactly `400.1` nm.
    pub fn convert_value(self, value: f64, to: WaveUnit) -> f64 {
        let delta = self.exponent() - to.exponent();
        match delta.cmp(&0) {
            std::cmp::Ordering::Equal => value,
            std::cmp::Ordering::Greater => value * 10f64.powi(delta),
            std::cmp::Ordering::Less => value / 10f64.powi(-delta),
        }
    }

    /// Convert a whole wavelength vector into `to`.
    pub fn convert(self, values: &[f64], to: WaveUnit) -> Vec<f64> {
        values.iter().map(|&v| self.convert_value(v, to)).collect()
    }
}

impl fmt::Display for WaveUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WaveUnit::Angstrom => "Angstrom",
            WaveUnit::Nanometer => "nm",
            WaveUnit::Micrometer => "um",
            WaveUnit::Meter => "m",
        };
        write!(f, "{s}")
    }
}

impl FromStr for WaveUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "angstrom" | "angstroms" | "a" | "aa" | "å" => Ok(WaveUnit::Angstrom),
            "nm" | "nanometer" | "nanometers" => Ok(WaveUnit::Nanometer),
            "um" | "µm" | "micron" | "microns" | "micrometer" => Ok(WaveUnit::Micrometer),
            "m" | "meter" | "meters" => Ok(WaveUnit::Meter),
            _ => Err(UnitParseError::UnknownWave(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// FluxUnit / DataUnit – unit of the data vector
// ---------------------------------------------------------------------------

/// Named base units a flux/intensity vector can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluxUnit {
    /// Raw detector counts.
    Counts,
    /// Analog-to-digital units.
    Adu,
    /// Photo-electrons.
    Electron,
    /// Jansky.
    Jansky,
    /// erg s⁻¹ cm⁻² Å⁻¹, the usual F_λ unit.
    FluxDensity,
    /// Seconds, so that rates (counts s⁻¹) can be formed.
    Second,
}

impl FluxUnit {
    fn symbol(self) -> &'static str {
        match self {
            FluxUnit::Counts => "counts",
            FluxUnit::Adu => "adu",
            FluxUnit::Electron => "electron",
            FluxUnit::Jansky => "Jy",
            FluxUnit::FluxDensity => "erg/s/cm2/Angstrom",
            FluxUnit::Second => "s",
        }
    }
}

impl FromStr for FluxUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counts" | "count" | "ct" => Ok(FluxUnit::Counts),
            "adu" => Ok(FluxUnit::Adu),
            "electron" | "electrons" | "e-" => Ok(FluxUnit::Electron),
            "jy" | "jansky" => Ok(FluxUnit::Jansky),
            "erg/s/cm2/angstrom" | "erg/s/cm2/a" | "flam" => Ok(FluxUnit::FluxDensity),
            "s" | "second" | "seconds" => Ok(FluxUnit::Second),
            _ => Err(UnitParseError::UnknownFlux(s.to_string())),
        }
    }
}

/// Composite unit of a data vector: a product of [`FluxUnit`] powers.
///
/// The empty product is the dimensionless unit, which is what continuum
/// normalised spectra carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataUnit {
    powers: BTreeMap<FluxUnit, i32>,
}

impl DataUnit {
    pub fn dimensionless() -> Self {
        Self::default()
    }

    pub fn is_dimensionless(&self) -> bool {
        self.powers.is_empty()
    }

    /// Exponent of `base` in this unit (0 when absent).
    pub fn power_of(&self, base: FluxUnit) -> i32 {
        self.powers.get(&base).copied().unwrap_or(0)
    }

    /// Unit of the product `self × other`.
    pub fn multiply(&self, other: &DataUnit) -> DataUnit {
        self.combine(other, 1)
    }

    /// Unit of the quotient `self / other`.
    pub fn divide(&self, other: &DataUnit) -> DataUnit {
        self.combine(other, -1)
    }

    fn combine(&self, other: &DataUnit, sign: i32) -> DataUnit {
        let mut powers = self.powers.clone();
        for (&base, &p) in &other.powers {
            let entry = powers.entry(base).or_insert(0);
            *entry += sign * p;
            if *entry == 0 {
                powers.remove(&base);
            }
        }
        DataUnit { powers }
    }
}

impl From<FluxUnit> for DataUnit {
    fn from(base: FluxUnit) -> Self {
        let mut powers = BTreeMap::new();
        powers.insert(base, 1);
        DataUnit { powers }
    }
}

impl fmt::Display for DataUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.powers.is_empty() {
            return write!(f, "dimensionless");
        }
        let terms: Vec<String> = self
            .powers
            .iter()
            .map(|(base, &p)| {
                if p == 1 {
                    base.symbol().to_string()
                } else {
                    format!("{}^{p}", base.symbol())
                }
            })
            .collect();
        write!(f, "{}", terms.join(" "))
    }
}

/// Accepts whitespace separated terms such as `"counts s^-1"`, mirroring
/// the [`Display`](fmt::Display) output.
impl FromStr for DataUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("dimensionless") {
            return Ok(DataUnit::dimensionless());
        }
        let mut unit = DataUnit::dimensionless();
        for term in trimmed.split_whitespace() {
            let (name, power) = match term.split_once('^') {
                Some((name, exp)) => {
                    let p = exp
                        .parse::<i32>()
                        .map_err(|_| UnitParseError::BadExponent(term.to_string()))?;
                    (name, p)
                }
                None => (term, 1),
            };
            let base: FluxUnit = name.parse()?;
            let mut single = BTreeMap::new();
            single.insert(base, power);
            unit = unit.multiply(&DataUnit { powers: single });
        }
        Ok(unit)
    }
}

// ---------------------------------------------------------------------------
// Quantity – a unit-tagged scalar operand
// ---------------------------------------------------------------------------

/// A scalar carrying an explicit data unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: DataUnit,
}

impl Quantity {
    pub fn new(value: f64, unit: impl Into<DataUnit>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }
}
