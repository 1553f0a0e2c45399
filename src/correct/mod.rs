/// Correction layer: alignment by cross-correlation and telluric removal.
///
/// ```text
///   target Spectrum ──┐
///                     ▼
///   calibrations ──▶ telluric ──▶ xcorr  (integer shift per calibration)
///                     │
///                     ├─ amplitude scan over the overlap
///                     ├─ select lowest RMS
///                     ▼
///               corrected Spectrum
/// ```

pub mod telluric;
pub mod xcorr;
