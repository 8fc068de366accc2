// src/processing/filters/iir.rs
//! Butterworth IIR design and zero-phase filtering
//!
//! Filters are designed from the analog Butterworth prototype, moved to the
//! requested band, mapped to the z-plane with a prewarped bilinear transform
//! and stored as cascaded second-order sections. [`IirFilter::filtfilt`] runs
//! the cascade forward and backward with odd-extension padding and steady
//! state initial conditions, so the output has no phase lag.

use super::{BandType, BiquadSection, FilterError};
use crate::config::constants::filters::MAX_ORDER;
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Relative tolerance used to decide that a pole is real
const REAL_POLE_TOLERANCE: f64 = 1e-10;

/// IIR filter made of second-order sections
#[derive(Debug, Clone)]
pub struct IirFilter {
    sections: Vec<BiquadSection>,
    order: usize,
}

impl IirFilter {
    /// Create Butterworth filter
    pub fn butterworth(order: usize, band: BandType, fsamp: f64) -> Result<Self, FilterError> {
        if order == 0 || order > MAX_ORDER {
            return Err(FilterError::InvalidParameters(format!("Order must be 1-{}", MAX_ORDER)));
        }
        if fsamp <= 0.0 {
            return Err(FilterError::InvalidParameters("Sampling frequency must be positive".to_string()));
        }
        let nyquist = fsamp / 2.0;
        let check = |f: f64| {
            if f <= 0.0 || f >= nyquist {
                Err(FilterError::InvalidParameters(format!(
                    "Cutoff {} Hz outside (0, {}) Hz",
                    f, nyquist
                )))
            } else {
                Ok(())
            }
        };
        match band {
            BandType::Lowpass(f) | BandType::Highpass(f) => check(f)?,
            BandType::Bandpass(low, high) => {
                check(low)?;
                check(high)?;
                if low >= high {
                    return Err(FilterError::InvalidParameters(
                        "Bandpass lowcut must be below highcut".to_string(),
                    ));
                }
            }
        }

        // Analog prototype, unit cutoff
        let n = order as f64;
        let prototype: Vec<Complex64> = (0..order)
            .map(|k| {
                let m = -n + 1.0 + 2.0 * k as f64;
                -Complex64::from_polar(1.0, PI * m / (2.0 * n))
            })
            .collect();

        let warp = |f: f64| 2.0 * fsamp * (PI * f / fsamp).tan();
        let (zeros, poles, gain) = match band {
            BandType::Lowpass(f) => {
                let wo = warp(f);
                let poles: Vec<Complex64> = prototype.iter().map(|p| *p * wo).collect();
                (Vec::new(), poles, wo.powi(order as i32))
            }
            BandType::Highpass(f) => {
                let wo = warp(f);
                let poles: Vec<Complex64> = prototype.iter().map(|p| wo / *p).collect();
                let prod: Complex64 = prototype.iter().map(|p| -*p).product();
                (vec![Complex64::new(0.0, 0.0); order], poles, (Complex64::new(1.0, 0.0) / prod).re)
            }
            BandType::Bandpass(low, high) => {
                let (wl, wh) = (warp(low), warp(high));
                let bw = wh - wl;
                let wo = (wl * wh).sqrt();
                let mut poles = Vec::with_capacity(2 * order);
                for p in &prototype {
                    let p_lp = *p * (bw / 2.0);
                    let root = (p_lp * p_lp - wo * wo).sqrt();
                    poles.push(p_lp + root);
                    poles.push(p_lp - root);
                }
                (vec![Complex64::new(0.0, 0.0); order], poles, bw.powi(order as i32))
            }
        };

        let (zd, pd, kd) = bilinear(&zeros, &poles, gain, fsamp);
        let sections = zpk_to_sections(&zd, &pd, kd);
        Ok(Self { sections, order })
    }

    /// Second-order sections of the cascade
    pub fn sections(&self) -> &[BiquadSection] {
        &self.sections
    }

    /// Get filter order
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of samples added on each side before filtering
    pub fn padlen(&self) -> usize {
        let n = self.sections.len();
        let zero_b2 = self.sections.iter().filter(|s| s.b2 == 0.0).count();
        let zero_a2 = self.sections.iter().filter(|s| s.a2 == 0.0).count();
        3 * (2 * n + 1 - zero_b2.min(zero_a2))
    }

    /// Filter once, forward, starting from the given section states
    fn run(&self, x: &[f64], mut states: Vec<[f64; 2]>) -> Vec<f64> {
        let mut y = Vec::with_capacity(x.len());
        for &sample in x {
            let mut value = sample;
            for (s, z) in self.sections.iter().zip(states.iter_mut()) {
                let out = s.b0 * value + z[0];
                z[0] = s.b1 * value - s.a1 * out + z[1];
                z[1] = s.b2 * value - s.a2 * out;
                value = out;
            }
            y.push(value);
        }
        y
    }

    /// Steady-state section states for a unit step
    fn step_states(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|s| {
                let [z0, z1] = s.step_state();
                let zi = [scale * z0, scale * z1];
                scale *= s.dc_gain();
                zi
            })
            .collect()
    }

    /// Zero-phase forward-backward filtering
    pub fn filtfilt(&self, x: &[f64]) -> Result<Vec<f64>, FilterError> {
        let edge = self.padlen();
        if x.len() <= edge {
            return Err(FilterError::SignalTooShort { length: x.len(), padlen: edge });
        }

        let ext = odd_extension(x, edge);
        let zi = self.step_states();

        let x0 = ext[0];
        let forward = self.run(&ext, zi.iter().map(|z| [z[0] * x0, z[1] * x0]).collect());

        let y0 = forward[forward.len() - 1];
        let reversed: Vec<f64> = forward.into_iter().rev().collect();
        let mut backward = self.run(&reversed, zi.iter().map(|z| [z[0] * y0, z[1] * y0]).collect());
        backward.reverse();

        Ok(backward[edge..backward.len() - edge].to_vec())
    }
}

/// Bilinear transform of analog zeros, poles and gain
fn bilinear(zeros: &[Complex64], poles: &[Complex64], gain: f64, fsamp: f64) -> (Vec<Complex64>, Vec<Complex64>, f64) {
    let fs2 = Complex64::new(2.0 * fsamp, 0.0);
    let mut zd: Vec<Complex64> = zeros.iter().map(|z| (fs2 + *z) / (fs2 - *z)).collect();
    let pd: Vec<Complex64> = poles.iter().map(|p| (fs2 + *p) / (fs2 - *p)).collect();

    // Zeros at infinity move to Nyquist
    zd.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(poles.len() - zeros.len()));

    let num: Complex64 = zeros.iter().map(|z| fs2 - *z).product();
    let den: Complex64 = poles.iter().map(|p| fs2 - *p).product();
    (zd, pd, gain * (num / den).re)
}

/// Group conjugate poles and real zeros into second-order sections
fn zpk_to_sections(zeros: &[Complex64], poles: &[Complex64], gain: f64) -> Vec<BiquadSection> {
    let mut pole_groups: Vec<Vec<f64>> = Vec::new();
    let mut real_poles = Vec::new();
    for p in poles {
        if p.im.abs() <= REAL_POLE_TOLERANCE * p.norm().max(1.0) {
            real_poles.push(p.re);
        } else if p.im > 0.0 {
            // [a1, a2] of the conjugate pair
            pole_groups.push(vec![-2.0 * p.re, p.norm_sqr()]);
        }
    }
    real_poles.sort_by(|a, b| a.total_cmp(b));
    for pair in real_poles.chunks(2) {
        match pair {
            [r1, r2] => pole_groups.push(vec![-(r1 + r2), r1 * r2]),
            [r] => pole_groups.push(vec![-r]),
            _ => {}
        }
    }

    // Real zeros paired from both ends of the sorted list
    let mut z: Vec<f64> = zeros.iter().map(|z| z.re).collect();
    z.sort_by(|a, b| a.total_cmp(b));
    let mut zero_queue = Vec::with_capacity(z.len());
    let half = z.len() / 2;
    for i in 0..half {
        zero_queue.push(z[i]);
        zero_queue.push(z[z.len() - 1 - i]);
    }
    if z.len() % 2 == 1 {
        zero_queue.push(z[half]);
    }
    let mut zero_iter = zero_queue.into_iter();

    // Single real pole goes last, matching the single zero
    pole_groups.sort_by_key(|g| std::cmp::Reverse(g.len()));

    let mut sections: Vec<BiquadSection> = pole_groups
        .iter()
        .map(|group| {
            if group.len() == 2 {
                let z1 = zero_iter.next().unwrap_or(0.0);
                let z2 = zero_iter.next().unwrap_or(0.0);
                BiquadSection { b0: 1.0, b1: -(z1 + z2), b2: z1 * z2, a1: group[0], a2: group[1] }
            } else {
                let z1 = zero_iter.next().unwrap_or(0.0);
                BiquadSection { b0: 1.0, b1: -z1, b2: 0.0, a1: group[0], a2: 0.0 }
            }
        })
        .collect();

    if let Some(first) = sections.first_mut() {
        first.b0 *= gain;
        first.b1 *= gain;
        first.b2 *= gain;
    }
    sections
}

/// Odd extension of `edge` samples at both ends
fn odd_extension(x: &[f64], edge: usize) -> Vec<f64> {
    let n = x.len();
    let mut ext = Vec::with_capacity(n + 2 * edge);
    let first = x[0];
    let last = x[n - 1];
    for i in (1..=edge).rev() {
        ext.push(2.0 * first - x[i]);
    }
    ext.extend_from_slice(x);
    for i in 1..=edge {
        ext.push(2.0 * last - x[n - 1 - i]);
    }
    ext
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_dc_gain(filter: &IirFilter) -> f64 {
        filter.sections().iter().map(|s| s.dc_gain()).product()
    }

    fn sine(freq: f64, fsamp: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fsamp).sin()).collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_butterworth_lowpass_creation() {
        let filter = IirFilter::butterworth(4, BandType::Lowpass(15.0), 2048.0).unwrap();
        assert_eq!(filter.order(), 4);
        assert_eq!(filter.sections().len(), 2);
        assert!((total_dc_gain(&filter) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_odd_order_uses_first_order_section() {
        let filter = IirFilter::butterworth(3, BandType::Lowpass(100.0), 1000.0).unwrap();
        assert_eq!(filter.sections().len(), 2);
        assert!(filter.sections().iter().any(|s| s.is_first_order()));
        assert!((total_dc_gain(&filter) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let filter = IirFilter::butterworth(2, BandType::Highpass(20.0), 2048.0).unwrap();
        assert!(total_dc_gain(&filter).abs() < 1e-9);
    }

    #[test]
    fn test_bandpass_keeps_passband() {
        let fsamp = 2048.0;
        let filter = IirFilter::butterworth(2, BandType::Bandpass(20.0, 500.0), fsamp).unwrap();
        assert_eq!(filter.sections().len(), 2);

        let passed = filter.filtfilt(&sine(100.0, fsamp, 4096)).unwrap();
        let middle = &passed[1024..3072];
        assert!((rms(middle) - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.02);

        let blocked = filter.filtfilt(&sine(1.0, fsamp, 8192)).unwrap();
        assert!(rms(&blocked[2048..6144]) < 0.01);
    }

    #[test]
    fn test_filtfilt_preserves_constant() {
        let filter = IirFilter::butterworth(4, BandType::Lowpass(15.0), 2048.0).unwrap();
        let out = filter.filtfilt(&vec![3.5; 500]).unwrap();
        assert!(out.iter().all(|v| (v - 3.5).abs() < 1e-9));
    }

    #[test]
    fn test_filtfilt_has_no_lag() {
        let fsamp = 1000.0;
        let filter = IirFilter::butterworth(4, BandType::Lowpass(50.0), fsamp).unwrap();
        let x = sine(5.0, fsamp, 2000);
        let y = filter.filtfilt(&x).unwrap();
        let peak_x = (200..400).max_by(|&a, &b| x[a].total_cmp(&x[b])).unwrap();
        let peak_y = (200..400).max_by(|&a, &b| y[a].total_cmp(&y[b])).unwrap();
        assert!((peak_x as i64 - peak_y as i64).abs() <= 1);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(IirFilter::butterworth(0, BandType::Lowpass(100.0), 1000.0).is_err());
        assert!(IirFilter::butterworth(2, BandType::Lowpass(600.0), 1000.0).is_err());
        assert!(IirFilter::butterworth(2, BandType::Lowpass(0.0), 1000.0).is_err());
        assert!(IirFilter::butterworth(2, BandType::Bandpass(300.0, 100.0), 1000.0).is_err());
    }

    #[test]
    fn test_short_signal_rejected() {
        let filter = IirFilter::butterworth(2, BandType::Bandpass(20.0, 500.0), 2048.0).unwrap();
        assert!(matches!(
            filter.filtfilt(&[0.0; 10]),
            Err(FilterError::SignalTooShort { .. })
        ));
    }
}
