// src/mathtools/mod.rs
//! Numerical helpers shared by the analyses

pub mod accuracy;
pub mod mle;

pub use accuracy::{compute_pnr, compute_sil, PnrMode};
pub use mle::{derivatives_beamforming, find_mle_teta, mle_cv_est};

use crate::processing::{correlate2d_full, correlate_full};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Scale values to `[0, 1]`
///
/// A constant input yields NaN, as the range is zero.
pub fn min_max_scaling(x: ArrayView1<f64>) -> Array1<f64> {
    let min = x.iter().copied().filter(|v| !v.is_nan()).fold(f64::INFINITY, f64::min);
    let max = x.iter().copied().filter(|v| !v.is_nan()).fold(f64::NEG_INFINITY, f64::max);
    x.mapv(|v| (v - min) / (max - min))
}

/// Which value [`norm_xcorr`] reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XcorrOut {
    /// Largest positive correlation
    Max,
    /// Correlation with the largest magnitude, sign kept
    #[default]
    Both,
}

/// Normalised cross-correlation of two signals
///
/// Each signal is divided by its L2 norm, so identical signals give 1.
pub fn norm_xcorr(sig1: &[f64], sig2: &[f64], out: XcorrOut) -> f64 {
    let norm = |s: &[f64]| s.iter().map(|v| v * v).sum::<f64>().sqrt();
    let (n1, n2) = (norm(sig1), norm(sig2));
    let a: Vec<f64> = sig1.iter().map(|v| v / n1).collect();
    let b: Vec<f64> = sig2.iter().map(|v| v / n2).collect();
    let c = correlate_full(&a, &b);

    match out {
        XcorrOut::Max => c.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        XcorrOut::Both => c
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best }),
    }
}

/// Normalised 2D cross-correlation of two channel tables
///
/// Returns the correlation matrix divided by `sqrt(sum(a^2) * sum(b^2))` and
/// its maximum. NaN cells count as zero.
pub fn norm_twod_xcorr(a: ArrayView2<f64>, b: ArrayView2<f64>) -> (Array2<f64>, f64) {
    let a = a.mapv(|v| if v.is_nan() { 0.0 } else { v });
    let b = b.mapv(|v| if v.is_nan() { 0.0 } else { v });
    let energy = (a.mapv(|v| v * v).sum() * b.mapv(|v| v * v).sum()).sqrt();

    let normalised = correlate2d_full(a.view(), b.view()).mapv(|v| v / energy);
    let max = normalised.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (normalised, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_min_max_scaling() {
        let scaled = min_max_scaling(array![2.0, 4.0, 6.0].view());
        assert_eq!(scaled, array![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_norm_xcorr_identity_and_sign() {
        let s = [0.0, 1.0, 3.0, -2.0, 0.5];
        assert!((norm_xcorr(&s, &s, XcorrOut::Max) - 1.0).abs() < 1e-10);

        let inverted: Vec<f64> = s.iter().map(|v| -v).collect();
        assert!((norm_xcorr(&s, &inverted, XcorrOut::Both) + 1.0).abs() < 1e-10);
        assert!(norm_xcorr(&s, &inverted, XcorrOut::Max) < 1.0);
    }

    #[test]
    fn test_norm_twod_xcorr_identity() {
        let a = array![[1.0, 2.0], [3.0, f64::NAN], [0.0, -1.0]];
        let (matrix, max) = norm_twod_xcorr(a.view(), a.view());
        assert_eq!(matrix.dim(), (5, 3));
        assert!((max - 1.0).abs() < 1e-9);
    }
}
