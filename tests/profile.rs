//! Line extraction with a modelled continuum.

use approx::assert_abs_diff_eq;
use rusty_spectra::{
    Interpolation, LinearCalibration, ResampleError, Spectrum, SpectrumError, WaveUnit,
};

fn continuum_at(w: f64) -> f64 {
    1.0 + 0.001 * (w - 6550.0)
}

/// Gaussian absorption line of depth 0.4 at 6550 Å on a sloped continuum.
fn absorption_line() -> Spectrum {
    let wave = LinearCalibration::new(0.0, 6500.0, 0.1).build(1001).unwrap();
    let data = wave
        .iter()
        .map(|&w| continuum_at(w) - 0.4 * (-(w - 6550.0).powi(2) / (2.0 * 0.25)).exp())
        .collect();
    Spectrum::new(data, wave).unwrap()
}

const BOUNDS: [f64; 4] = [6530.0, 6545.0, 6555.0, 6570.0];

#[test]
fn continuum_is_recovered_under_the_line() {
    let spectrum = absorption_line();
    for kind in [Interpolation::CubicSpline, Interpolation::Linear] {
        let profile = spectrum.extract_line(BOUNDS, kind).unwrap();

        assert!(profile
            .line
            .wave()
            .iter()
            .all(|&w| w > BOUNDS[1] && w < BOUNDS[2]));
        assert!(profile
            .continuum
            .wave()
            .iter()
            .all(|&w| w > BOUNDS[0] && w < BOUNDS[3]));
        assert_eq!(profile.line_rms.len(), profile.line.len());

        for (w, c) in profile.continuum.wave().iter().zip(profile.continuum.data()) {
            assert_abs_diff_eq!(*c, continuum_at(*w), epsilon = 3e-3);
        }
        assert!(profile.continuum_rms < 1e-3);

        // Normalised line depth at the centre.
        let centre = profile
            .line
            .wave()
            .iter()
            .position(|&w| (w - 6550.0).abs() < 1e-6)
            .unwrap();
        let continuum = profile.continuum.resampled_onto(&profile.line).unwrap();
        let depth = 1.0 - profile.line.data()[centre] / continuum.data()[centre];
        assert_abs_diff_eq!(depth, 0.4, epsilon = 3e-3);
    }
}

#[test]
fn line_rms_grows_inside_the_line() {
    let profile = absorption_line()
        .extract_line(BOUNDS, Interpolation::CubicSpline)
        .unwrap();
    let first = profile.line_rms[0];
    let deepest = profile.line_rms.iter().cloned().fold(f64::MIN, f64::max);
    assert!(deepest > first);
    assert!(first >= profile.continuum_rms * 0.99);
}

#[test]
fn bounds_must_be_strictly_increasing() {
    let spectrum = absorption_line();
    for bounds in [
        [6545.0, 6530.0, 6555.0, 6570.0],
        [6530.0, 6545.0, 6545.0, 6570.0],
        [6530.0, f64::NAN, 6555.0, 6570.0],
    ] {
        assert!(matches!(
            spectrum.extract_line(bounds, Interpolation::Linear),
            Err(SpectrumError::InvalidWindow { .. })
        ));
    }
    assert!(matches!(
        spectrum.extract_line_with_bandwidth(BOUNDS, Interpolation::Linear, 0.0),
        Err(SpectrumError::InvalidBandwidth { .. })
    ));
}

#[test]
fn empty_windows_are_rejected() {
    let spectrum = absorption_line();
    // No sample between 6545.01 and 6545.05.
    assert_eq!(
        spectrum
            .extract_line([6530.0, 6545.01, 6545.05, 6570.0], Interpolation::Linear)
            .unwrap_err(),
        SpectrumError::Empty
    );
    // Entirely beyond the spectrum.
    assert_eq!(
        spectrum
            .extract_line([7000.0, 7010.0, 7020.0, 7030.0], Interpolation::Linear)
            .unwrap_err(),
        SpectrumError::Empty
    );
}

#[test]
fn one_sided_continuum_cannot_cross_the_gap() {
    let err = absorption_line()
        .extract_line([6530.0, 6545.0, 6650.0, 6700.0], Interpolation::Linear)
        .unwrap_err();
    assert!(matches!(
        err,
        SpectrumError::Resample {
            operand: "continuum",
            source: ResampleError::Domain { .. }
        }
    ));
}

#[test]
fn default_bandwidth_follows_wave_unit() {
    let angstrom = absorption_line();
    let nm = Spectrum::new(
        angstrom.data().to_vec(),
        WaveUnit::Angstrom.convert(angstrom.wave(), WaveUnit::Nanometer),
    )
    .unwrap()
    .with_units(WaveUnit::Nanometer, rusty_spectra::DataUnit::dimensionless());

    let a = angstrom.extract_line(BOUNDS, Interpolation::Linear).unwrap();
    let b = nm
        .extract_line([653.0, 654.5, 655.5, 657.0], Interpolation::Linear)
        .unwrap();
    assert_eq!(a.line.len(), b.line.len());
    assert_abs_diff_eq!(a.continuum_rms, b.continuum_rms, epsilon = 1e-9);
}
