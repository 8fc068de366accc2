// src/mathtools/mle.rs
//! Maximum likelihood estimation of conduction velocity
//!
//! Channels are rows of the input table. Delays (`teta`) are in samples and
//! may be fractional; the estimator works in the frequency domain so
//! sub-sample shifts come for free.

use crate::config::constants::mle::{MAX_CV_M_S, MAX_ITERATIONS, MAX_STEP, MIN_CV_M_S, TOLERANCE};
use crate::error::{EmgErrorBuilder, EmgResult, ProcessingStage};
use ndarray::ArrayView2;
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;
use tracing::trace;

/// First and second derivative of the beamforming mean square error
///
/// `row` is the reference channel; every other channel is weighted by its
/// distance in electrodes from it.
pub fn derivatives_beamforming(sig: ArrayView2<f64>, row: usize, teta: f64) -> (f64, f64) {
    let (total_rows, n) = sig.dim();
    if total_rows < 2 || n == 0 || row >= total_rows {
        return (0.0, 0.0);
    }
    let m = total_rows - 1;

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let spectrum = |r: usize| {
        let mut buf: Vec<Complex64> = sig.row(r).iter().map(|&v| Complex64::new(v, 0.0)).collect();
        fft.process(&mut buf);
        buf
    };

    let reference = spectrum(row);
    let others: Vec<(f64, Vec<Complex64>)> = (0..total_rows)
        .filter(|&r| r != row)
        .map(|r| (r as f64 - row as f64, spectrum(r)))
        .collect();

    let n_f = n as f64;
    let half = (n_f / 2.0).round_ties_even() as usize;
    let (mut de1, mut de2) = (0.0, 0.0);

    for k in 1..=half.min(n - 1) {
        let kf = k as f64;
        let rotation = |pos: f64| Complex64::from_polar(1.0, 2.0 * PI * kf * pos * teta / n_f);
        let weight = |pos: f64| 2.0 * PI * kf * pos / n_f;

        let (mut pair1, mut pair2) = (0.0, 0.0);
        for i in 0..m {
            for u in (i + 1)..m {
                let dp = others[i].0 - others[u].0;
                let product = others[i].1[k] * others[u].1[k].conj() * rotation(dp);
                pair1 -= (product * weight(dp)).im;
                pair2 -= (product * weight(dp).powi(2)).re;
            }
        }

        let (mut sum1, mut sum2) = (Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0));
        for (pos, spec) in &others {
            let shifted = spec[k] * rotation(*pos);
            sum1 += shifted * weight(*pos);
            sum2 += shifted * weight(*pos).powi(2);
        }
        let ref_conj = reference[k].conj();

        let m_f = m as f64;
        de1 += pair1 * 2.0 / (m_f * m_f) + 2.0 * (ref_conj * sum1).im / m_f;
        de2 += pair2 * 2.0 / (m_f * m_f) + 2.0 * (ref_conj * sum2).re / m_f;
    }

    (2.0 / n_f * de1, 2.0 / n_f * de2)
}

/// Newton search of the delay starting at `initial_teta`
///
/// Returns `(cv, teta)` with `cv` in m/s given `ied` in mm.
pub fn mle_cv_est(sig: ArrayView2<f64>, initial_teta: f64, ied: f64, fsamp: f64) -> (f64, f64) {
    let ied_m = ied / 1000.0;
    let eps = f64::EPSILON;
    let mut t = initial_teta;
    let mut teta = f64::INFINITY;
    let mut trial = 0;

    while (teta - t).abs() >= TOLERANCE && trial < MAX_ITERATIONS {
        trial += 1;
        teta = t;

        let (mut de1, mut de2) = (0.0, 0.0);
        for row in 0..sig.nrows() {
            let (d1, d2) = derivatives_beamforming(sig, row, teta);
            de1 += d1 + eps;
            de2 += d2 + eps;
        }

        let fallback = -MAX_STEP * de1.signum();
        let step = if de2 > 0.0 {
            let u = -de1 / de2;
            if u.abs() > MAX_STEP {
                fallback
            } else {
                u
            }
        } else {
            fallback
        };
        t = teta + step;
    }
    trace!(teta, iterations = trial, "MLE converged");

    (ied_m / (teta / fsamp), teta)
}

/// Initial delay from the correlation of two adjacent channels
///
/// The delay is searched between the values giving 10 and 1 m/s and refined
/// with a parabola through the peak and its neighbours.
pub fn find_mle_teta(sig1: &[f64], sig2: &[f64], ied: f64, fsamp: f64) -> EmgResult<f64> {
    let n = sig1.len().min(sig2.len());
    let ied_m = ied / 1000.0;
    let teta_min = (ied_m / MAX_CV_M_S * fsamp).floor() as usize;
    let teta_max = ((ied_m / MIN_CV_M_S * fsamp).ceil() as usize).min(n.saturating_sub(1));
    if n == 0 || teta_min > teta_max {
        return Err(EmgErrorBuilder::new("mathtools::mle", "find_mle_teta").processing(
            ProcessingStage::ConductionVelocity,
            "signals are too short for the physiological delay range",
        ));
    }

    let delays: Vec<usize> = (teta_min..=teta_max).collect();
    let corr: Vec<f64> = delays
        .iter()
        .map(|&d| (0..n - d).map(|i| sig1[i] * sig2[i + d]).sum())
        .collect();

    let pos = corr
        .iter()
        .enumerate()
        .fold(0, |best, (i, v)| if *v > corr[best] { i } else { best });

    if pos > 0 && pos + 1 < corr.len() {
        let (ym, y0, yp) = (corr[pos - 1], corr[pos], corr[pos + 1]);
        let curvature = ym - 2.0 * y0 + yp;
        if curvature != 0.0 {
            return Ok(delays[pos] as f64 + 0.5 * (ym - yp) / curvature);
        }
    }
    Ok(delays[pos] as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Gaussian pulse travelling along the channels with a fixed delay
    fn propagating(channels: usize, len: usize, delay: f64) -> Array2<f64> {
        Array2::from_shape_fn((channels, len), |(c, i)| {
            let centre = 30.0 + c as f64 * delay;
            let x = (i as f64 - centre) / 3.0;
            (-x * x).exp() - 0.5 * (-(x - 2.0) * (x - 2.0)).exp()
        })
    }

    #[test]
    fn test_find_mle_teta_integer_delay() {
        let sig = propagating(2, 128, 4.0);
        let teta = find_mle_teta(sig.row(0).as_slice().unwrap(), sig.row(1).as_slice().unwrap(), 8.0, 2048.0).unwrap();
        assert!((teta - 4.0).abs() < 0.3, "teta = {}", teta);
    }

    #[test]
    fn test_mle_recovers_fractional_delay() {
        let sig = propagating(3, 128, 3.4);
        let initial = find_mle_teta(sig.row(1).as_slice().unwrap(), sig.row(2).as_slice().unwrap(), 8.0, 2048.0).unwrap();
        let (cv, teta) = mle_cv_est(sig.view(), initial, 8.0, 2048.0);
        assert!((teta - 3.4).abs() < 0.1, "teta = {}", teta);
        let expected_cv = 0.008 / (3.4 / 2048.0);
        assert!((cv - expected_cv).abs() / expected_cv < 0.05);
    }

    #[test]
    fn test_find_mle_teta_rejects_short_signals() {
        assert!(find_mle_teta(&[], &[], 8.0, 2048.0).is_err());
    }

    #[test]
    fn test_derivatives_need_two_channels() {
        let sig = propagating(1, 64, 2.0);
        assert_eq!(derivatives_beamforming(sig.view(), 0, 1.0), (0.0, 0.0));
    }
}
