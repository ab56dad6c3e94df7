//! # Peak Refinement
//!
//! Sub-bin parabolic interpolation, grounded on the two interpolation
//! passes this module used to hold (a YIN-buffer parabolic fit and a
//! log-magnitude spectral refinement) — both solve the same three-point
//! quadratic-apex problem. Only one pass is needed here, applied directly
//! to linear FFT magnitudes: `p = 0.5 * (a - c) / (a - 2b + c)`.

/// Given magnitudes at three consecutive FFT bins centered on the peak bin
/// (`before`, `at`, `after`), returns the fractional bin offset `p` of the
/// true peak relative to the center bin, in `(-0.5, 0.5)`.
///
/// Falls back to `0.0` (no refinement) when the three points are colinear
/// (denominator underflows to zero), which happens for a perfectly flat
/// magnitude neighborhood.
pub fn parabolic_offset(before: f32, at: f32, after: f32) -> f32 {
    let denominator = before - 2.0 * at + after;
    if denominator.abs() < f32::EPSILON {
        return 0.0;
    }
    0.5 * (before - after) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds three samples of a synthetic downward parabola
    /// `y = -(x - apex)^2` around integer bin `center`, so the true apex
    /// sits at `center + p`.
    fn quadratic_samples(center: i32, p: f32) -> (f32, f32, f32) {
        let apex = center as f32 + p;
        let y = |x: i32| -((x as f32 - apex).powi(2));
        (y(center - 1), y(center), y(center + 1))
    }

    #[test]
    fn recovers_known_offsets() {
        for &p in &[-0.4, -0.2, -0.05, 0.0, 0.05, 0.2, 0.4] {
            let (a, b, c) = quadratic_samples(10, p);
            let recovered = parabolic_offset(a, b, c);
            assert!(
                (recovered - p).abs() < 1e-6,
                "p={p} recovered={recovered}"
            );
        }
    }

    #[test]
    fn flat_neighborhood_yields_zero() {
        assert_eq!(parabolic_offset(1.0, 1.0, 1.0), 0.0);
    }
}
