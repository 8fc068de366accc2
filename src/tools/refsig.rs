// src/tools/refsig.rs
//! Filtering of the signals and reference signal measurements

use crate::emgfile::{EmgFile, HasRefSignal};
use crate::error::{EmgErrorBuilder, EmgResult};
use crate::processing::{butterworth_sos, sosfiltfilt, BandType};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use tracing::debug;

/// Band-pass every EMG channel with a zero-phase Butterworth filter
pub fn filter_rawemg(emgfile: &EmgFile, order: usize, lowcut: f64, highcut: f64) -> EmgResult<EmgFile> {
    let sos = butterworth_sos(order, BandType::Bandpass(lowcut, highcut), emgfile.fsamp)?;

    let channels: Vec<Vec<f64>> = emgfile.raw_signal.axis_iter(Axis(1)).map(|c| c.to_vec()).collect();
    let filtered: Vec<Vec<f64>> = channels
        .par_iter()
        .map(|channel| sosfiltfilt(&sos, channel))
        .collect::<Result<_, _>>()?;

    let mut out = emgfile.clone();
    let mut raw = Array2::zeros(emgfile.raw_signal.dim());
    for (mut column, values) in raw.axis_iter_mut(Axis(1)).zip(filtered) {
        column.assign(&Array1::from(values));
    }
    out.raw_signal = raw;
    debug!(order, lowcut, highcut, channels = out.n_channels(), "filtered raw EMG");
    Ok(out)
}

/// Low-pass the reference signal with a zero-phase Butterworth filter
pub fn filter_refsig<F: HasRefSignal + Clone>(file: &F, order: usize, cutoff: f64) -> EmgResult<F> {
    let sos = butterworth_sos(order, BandType::Lowpass(cutoff), file.fsamp())?;
    let filtered = sosfiltfilt(&sos, &file.ref_signal().to_vec())?;
    let mut out = file.clone();
    *out.ref_signal_mut() = Array1::from(filtered);
    Ok(out)
}

/// Remove the offset of the reference signal
///
/// With `auto > 0` the offset is the mean of the first `auto` samples,
/// otherwise `offsetval` is subtracted.
pub fn remove_offset<F: HasRefSignal + Clone>(file: &F, offsetval: f64, auto: usize) -> F {
    let signal = file.ref_signal();
    let offset = if auto > 0 {
        let n = auto.min(signal.len());
        if n == 0 {
            0.0
        } else {
            signal.iter().take(n).sum::<f64>() / n as f64
        }
    } else {
        offsetval
    };
    let mut out = file.clone();
    out.ref_signal_mut().mapv_inplace(|v| v - offset);
    out
}

/// Maximum of the reference signal, optionally in the inclusive sample range
///
/// The result is multiplied by `conversion_val` when it is not zero.
pub fn get_mvc(ref_signal: ArrayView1<f64>, range: Option<(usize, usize)>, conversion_val: f64) -> EmgResult<f64> {
    let values = match range {
        Some((start, end)) => {
            let (lo, hi) = (start.min(end), start.max(end));
            if hi >= ref_signal.len() {
                return Err(EmgErrorBuilder::new("tools::refsig", "get_mvc").mismatch(
                    "REF_SIGNAL",
                    "range beyond the end of the signal",
                    format!("< {}", ref_signal.len()),
                    hi,
                ));
            }
            ref_signal.slice_move(ndarray::s![lo..=hi])
        }
        None => ref_signal,
    };
    let mvc = values.iter().copied().filter(|v| !v.is_nan()).fold(f64::NAN, f64::max);
    if mvc.is_nan() {
        return Err(EmgErrorBuilder::new("tools::refsig", "get_mvc").invalid_data("REF_SIGNAL", "no values to measure"));
    }
    Ok(if conversion_val != 0.0 { mvc * conversion_val } else { mvc })
}

/// Rate of force development over one time interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rfd {
    pub ms: f64,
    pub value: f64,
}

/// Rate of force development from `startpoint` over each interval in `ms`
///
/// Values are in reference units per second, multiplied by `conversion_val`
/// when it is not zero.
pub fn compute_rfd(
    ref_signal: ArrayView1<f64>,
    fsamp: f64,
    ms: &[f64],
    startpoint: usize,
    conversion_val: f64,
) -> EmgResult<Vec<Rfd>> {
    let n_0 = *ref_signal.get(startpoint).ok_or_else(|| {
        EmgErrorBuilder::new("tools::refsig", "compute_rfd").mismatch(
            "startpoint",
            "start beyond the end of the signal",
            format!("< {}", ref_signal.len()),
            startpoint,
        )
    })?;

    ms.iter()
        .map(|&thisms| {
            let offset = (thisms * fsamp / 1000.0).round() as usize;
            let n_next = *ref_signal.get(startpoint + offset).ok_or_else(|| {
                EmgErrorBuilder::new("tools::refsig", "compute_rfd").mismatch(
                    "ms",
                    "interval ends beyond the signal",
                    format!("< {}", ref_signal.len()),
                    startpoint + offset,
                )
            })?;
            let mut value = (n_next - n_0) / (thisms / 1000.0);
            if conversion_val != 0.0 {
                value *= conversion_val;
            }
            Ok(Rfd { ms: thisms, value })
        })
        .collect()
}

/// Coefficient of variation (%) of the reference signal in `[start, end]`
///
/// Uses the sample standard deviation.
pub fn compute_covsteady(ref_signal: ArrayView1<f64>, start: usize, end: usize) -> EmgResult<f64> {
    let (lo, hi) = (start.min(end), start.max(end));
    if hi >= ref_signal.len() || hi == lo {
        return Err(EmgErrorBuilder::new("tools::refsig", "compute_covsteady")
            .invalid_data("REF_SIGNAL", "steady phase must span at least two samples inside the signal"));
    }
    let steady = ref_signal.slice(ndarray::s![lo..=hi]);
    let mean = steady.mean().unwrap_or(f64::NAN);
    Ok(steady.std(1.0) / mean * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emgfile::{EmgData, RefSigFile, Source};

    fn sine_file(freqs: &[f64], len: usize) -> EmgFile {
        let fs = 2048.0;
        let raw = Array2::from_shape_fn((len, 2), |(i, _)| {
            freqs.iter().map(|f| (2.0 * std::f64::consts::PI * f * i as f64 / fs).sin()).sum()
        });
        EmgFile::new(Source::Otb, "sine", raw, fs, 8.0)
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_filter_rawemg_removes_low_frequencies() {
        let file = sine_file(&[2.0, 100.0], 8192);
        let filtered = filter_rawemg(&file, 2, 20.0, 500.0).unwrap();
        let middle: Vec<f64> = filtered.raw_signal.column(0).iter().skip(2048).take(4096).copied().collect();
        assert!((rms(&middle) - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.05);
        assert_eq!(filtered.raw_signal.dim(), file.raw_signal.dim());
    }

    #[test]
    fn test_filter_refsig_on_refsig_file() {
        let signal = Array1::from_shape_fn(4096, |i| 10.0 + (2.0 * std::f64::consts::PI * 200.0 * i as f64 / 2048.0).sin());
        let data = EmgData::RefSig(RefSigFile::new(Source::OtbRefsig, "r", 2048.0, signal));
        let filtered = filter_refsig(&data, 4, 15.0).unwrap();
        let middle = filtered.ref_signal().slice(ndarray::s![1000..3000]).to_owned();
        assert!(middle.iter().all(|v| (v - 10.0).abs() < 0.01));
    }

    #[test]
    fn test_filter_refsig_rejects_short_signal() {
        let file = RefSigFile::new(Source::OtbRefsig, "r", 2048.0, Array1::from_elem(15, 1.0));
        assert!(filter_refsig(&file, 4, 15.0).is_err());
        let longer = RefSigFile::new(Source::OtbRefsig, "r", 2048.0, Array1::from_elem(16, 1.0));
        assert!(filter_refsig(&longer, 4, 15.0).is_ok());
    }

    #[test]
    fn test_remove_offset() {
        let file = RefSigFile::new(Source::OtbRefsig, "r", 100.0, Array1::from(vec![2.0, 4.0, 6.0, 10.0]));
        let auto = remove_offset(&file, 0.0, 2);
        assert_eq!(auto.ref_signal.to_vec(), vec![-1.0, 1.0, 3.0, 7.0]);
        let manual = remove_offset(&file, 2.0, 0);
        assert_eq!(manual.ref_signal.to_vec(), vec![0.0, 2.0, 4.0, 8.0]);
    }

    #[test]
    fn test_get_mvc() {
        let signal = Array1::from(vec![1.0, 5.0, 3.0, 8.0, 2.0]);
        assert_eq!(get_mvc(signal.view(), None, 0.0).unwrap(), 8.0);
        assert_eq!(get_mvc(signal.view(), Some((0, 2)), 0.0).unwrap(), 5.0);
        assert_eq!(get_mvc(signal.view(), Some((4, 2)), 0.0).unwrap(), 8.0);
        assert!((get_mvc(signal.view(), None, 9.81).unwrap() - 78.48).abs() < 1e-12);
        assert!(get_mvc(signal.view(), Some((0, 9)), 0.0).is_err());
    }

    #[test]
    fn test_compute_rfd_on_ramp() {
        // 2 units per second at 1 kHz
        let ramp = Array1::from_shape_fn(1000, |i| i as f64 * 0.002);
        let rfd = compute_rfd(ramp.view(), 1000.0, &[50.0, 100.0], 100, 0.0).unwrap();
        assert_eq!(rfd.len(), 2);
        assert!(rfd.iter().all(|r| (r.value - 2.0).abs() < 1e-9));
        assert!(compute_rfd(ramp.view(), 1000.0, &[950.0], 100, 0.0).is_err());
    }

    #[test]
    fn test_compute_covsteady() {
        let signal = Array1::from(vec![0.0, 9.0, 11.0, 9.0, 11.0, 0.0]);
        let cov = compute_covsteady(signal.view(), 1, 4).unwrap();
        let expected = (4.0_f64 / 3.0).sqrt() / 10.0 * 100.0;
        assert!((cov - expected).abs() < 1e-9);
    }
}
