use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XCorrError {
    #[error("cross-correlation needs equal lengths, got {a} and {b}")]
    LengthMismatch { a: usize, b: usize },
}

/// Pixel range `[start, end)` of `a` that overlaps `b` shifted by `shift`.
///
/// Pixel `i` of `a` pairs with pixel `i + shift` of `b`. Returns `None`
/// when the two do not overlap at all.
pub fn overlap(len: usize, shift: isize) -> Option<(usize, usize)> {
    let n = len as isize;
    let start = (-shift).max(0);
    let end = (n - shift).min(n);
    (start < end).then_some((start as usize, end as usize))
}

/// Root-mean-square of `a[i] - b[i + shift]` over the overlap.
pub fn residual_rms(a: &[f64], b: &[f64], shift: isize) -> Option<f64> {
    let (start, end) = overlap(a.len(), shift)?;
    let offset = (start as isize + shift) as usize;
    let sum: f64 = a[start..end]
        .iter()
        .zip(&b[offset..offset + (end - start)])
        .map(|(x, y)| (x - y).powi(2))
        .sum();
    Some((sum / (end - start) as f64).sqrt())
}

/// Integer shift in `[-lag, lag]` that best aligns `b` with `a`.
///
/// Each candidate shift `s` is scored by the RMS of `a[i] - b[i + s]` over
/// the overlapping pixels only; the lowest score wins. Ties go to the
/// smallest `|s|`, then to the negative shift. A `lag` of zero, or one at
/// least as long as the vectors, is clamped to what the data allows.
pub fn search(a: &[f64], b: &[f64], lag: usize) -> Result<isize, XCorrError> {
    if a.len() != b.len() {
        return Err(XCorrError::LengthMismatch {
            a: a.len(),
            b: b.len(),
        });
    }
    let lag = lag.min(a.len().saturating_sub(1)) as isize;
    if lag == 0 {
        return Ok(0);
    }

    // Visit 0, -1, 1, -2, 2, ... so a strict `<` implements the tie-break.
    let candidates = std::iter::once(0).chain((1..=lag).flat_map(|m| [-m, m]));

    let mut best: Option<(isize, f64)> = None;
    for shift in candidates {
        let Some(rms) = residual_rms(a, b, shift) else {
            continue;
        };
        if rms.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, score)| rms < score) {
            best = Some((shift, rms));
        }
    }

    Ok(best.map_or(0, |(shift, _)| shift))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Asymmetric bump so no shift other than the true one matches.
    fn signal(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                1.0 - 0.6 * (-(x - 40.0).powi(2) / 18.0).exp()
                    - 0.3 * (-(x - 55.0).powi(2) / 8.0).exp()
            })
            .collect()
    }

    /// `b[i] = a[i - d]`, padded with the continuum level.
    fn shifted(a: &[f64], d: isize) -> Vec<f64> {
        (0..a.len() as isize)
            .map(|i| {
                let j = i - d;
                if j >= 0 && (j as usize) < a.len() {
                    a[j as usize]
                } else {
                    1.0
                }
            })
            .collect()
    }

    #[test]
    fn identical_vectors_give_zero() {
        let a = signal(100);
        assert_eq!(search(&a, &a, 25).unwrap(), 0);
    }

    #[test]
    fn recovers_known_shift() {
        let a = signal(100);
        for d in [-7, -1, 1, 3, 12, 25] {
            let b = shifted(&a, d);
            assert_eq!(search(&a, &b, 25).unwrap(), d, "shift {d}");
        }
    }

    #[test]
    fn zero_lag_short_circuits() {
        let a = signal(100);
        let b = shifted(&a, 5);
        assert_eq!(search(&a, &b, 0).unwrap(), 0);
    }

    #[test]
    fn mismatched_lengths() {
        assert_eq!(
            search(&[1.0, 2.0], &[1.0], 3),
            Err(XCorrError::LengthMismatch { a: 2, b: 1 })
        );
    }

    #[test]
    fn ties_prefer_small_then_negative_shift() {
        // A constant vector scores zero at every shift.
        let flat = vec![1.0; 20];
        assert_eq!(search(&flat, &flat, 5).unwrap(), 0);

        // Period-2 signal: shifts of ±1 match equally well, 0 does not.
        let a: Vec<f64> = (0..20).map(|i| (i % 2) as f64).collect();
        let b: Vec<f64> = (0..20).map(|i| ((i + 1) % 2) as f64).collect();
        assert_eq!(search(&a, &b, 3).unwrap(), -1);
    }

    #[test]
    fn overlap_excludes_edges() {
        assert_eq!(overlap(10, 0), Some((0, 10)));
        assert_eq!(overlap(10, 3), Some((0, 7)));
        assert_eq!(overlap(10, -3), Some((3, 10)));
        assert_eq!(overlap(10, 10), None);
    }

    #[test]
    fn residual_rms_over_overlap_only() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [9.0, 1.0, 2.0, 3.0];
        // a[i] pairs with b[i + 1]: (1,1) (2,2) (3,3)
        assert_relative_eq!(residual_rms(&a, &b, 1).unwrap(), 0.0);
        // a[i] pairs with b[i]: diffs -8, 1, 1, 1
        assert_relative_eq!(residual_rms(&a, &b, 0).unwrap(), (67.0f64 / 4.0).sqrt());
    }
}
