/// Data layer: spectra, units, wavelength grids, resampling and loading.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Vec<Spectrum>
///   └──────────┘
///        │            ┌──────────┐
///        ▼            │   grid    │  (crpix, crval, cdelt) → wave
///   ┌──────────┐ ◀────┴──────────┘
///   │  model    │  Spectrum: data + wave + units + header
///   └──────────┘ ◀────┬──────────┐
///        │            │ resample  │  interpolate onto another grid
///        ▼            └──────────┘
///   ┌──────────┐
///   │ profile   │  line + modelled continuum from four bounds
///   └──────────┘
/// ```

pub mod grid;
pub mod loader;
pub mod model;
pub mod profile;
pub mod resample;
pub mod units;
