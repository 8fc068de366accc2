// src/mathtools/accuracy.rs
//! Decomposition accuracy metrics: silhouette and pulse-to-noise ratio

use crate::config::constants::firings::PNR_EXCLUSION_SAMPLES;
use std::collections::BTreeSet;

/// How [`compute_pnr`] separates peaks from noise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnrMode {
    /// Noise is every sample between the first and last discharge that is
    /// farther than `exclusion` samples from a discharge
    Constrained { exclusion: usize },
    /// Peaks are the samples above the Pi threshold derived from the
    /// discharge variability
    Pi { separate_paired_firings: bool },
}

impl Default for PnrMode {
    fn default() -> Self {
        PnrMode::Constrained {
            exclusion: PNR_EXCLUSION_SAMPLES,
        }
    }
}

/// Silhouette of the two clusters formed by the discharges and the rest
///
/// `ignore_negative_ipts` squares the source keeping its sign, which damps
/// negative unbalanced sources. NaN when there are no discharges.
pub fn compute_sil(ipts: &[f64], mupulses: &[usize], ignore_negative_ipts: bool) -> f64 {
    if mupulses.is_empty() {
        return f64::NAN;
    }
    let source: Vec<f64> = if ignore_negative_ipts {
        ipts.iter().map(|v| v * v.abs()).collect()
    } else {
        ipts.to_vec()
    };

    let pulses: BTreeSet<usize> = mupulses.iter().copied().filter(|&p| p < source.len()).collect();
    let peaks: Vec<f64> = pulses.iter().map(|&p| source[p]).collect();
    let noise: Vec<f64> = source
        .iter()
        .enumerate()
        .filter(|(i, _)| !pulses.contains(i))
        .map(|(_, &v)| v)
        .collect();

    let peak_centroid = mean(&peaks);
    let noise_centroid = mean(&noise);
    let intra: f64 = peaks.iter().map(|v| (v - peak_centroid).powi(2)).sum();
    let inter: f64 = peaks.iter().map(|v| (v - noise_centroid).powi(2)).sum();

    (inter - intra) / intra.max(inter)
}

/// Pulse-to-noise ratio in dB
pub fn compute_pnr(ipts: &[f64], mupulses: &[usize], fsamp: f64, mode: PnrMode) -> f64 {
    let pulses: Vec<usize> = mupulses.iter().copied().filter(|&p| p < ipts.len()).collect();
    if pulses.is_empty() {
        return f64::NAN;
    }
    let scale = mean(&pulses.iter().map(|&p| ipts[p]).collect::<Vec<_>>());
    let source: Vec<f64> = ipts.iter().map(|v| v / scale).collect();

    let (peaks, noise): (Vec<f64>, Vec<f64>) = match mode {
        PnrMode::Constrained { exclusion } => {
            let excluded: BTreeSet<usize> = pulses
                .iter()
                .flat_map(|&p| p.saturating_sub(exclusion)..=p + exclusion)
                .collect();
            let first = pulses[0];
            let last = pulses[pulses.len() - 1];
            let noise = (first..=last)
                .filter(|i| !excluded.contains(i))
                .map(|i| source[i])
                .filter(|v| !v.is_nan() && *v >= 0.0)
                .collect();
            (pulses.iter().map(|&p| source[p]).collect(), noise)
        }
        PnrMode::Pi { separate_paired_firings } => {
            let pi = pi_threshold(&pulses, fsamp, separate_paired_firings);
            let peaks = source.iter().copied().filter(|v| *v >= pi).collect();
            let noise = source.iter().copied().filter(|v| *v < pi).collect();
            (peaks, noise)
        }
    };

    let peak_power = mean(&peaks.iter().map(|v| v * v).collect::<Vec<_>>());
    let noise_power = mean(&noise.iter().map(|v| v * v).collect::<Vec<_>>());
    10.0 * (peak_power / noise_power).log10()
}

/// Pi value from the coefficient of variation of the inter-discharge intervals
///
/// Intervals above 500 ms are discarded. Paired discharges (below 50 ms) get
/// their own CoV when `separate` is set.
fn pi_threshold(pulses: &[usize], fsamp: f64, separate: bool) -> f64 {
    let idi: Vec<f64> = pulses
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64)
        .filter(|&d| d <= fsamp * 0.5)
        .collect();

    if !separate {
        let cov = population_cov(&idi);
        return if cov.is_nan() { 0.0 } else { cov };
    }

    let paired_limit = fsamp * 0.05;
    let non_paired: Vec<f64> = idi.iter().copied().filter(|&d| d >= paired_limit).collect();
    let paired: Vec<f64> = idi.iter().copied().filter(|&d| d < paired_limit).collect();
    let cov_of = |v: &[f64]| if v.len() > 1 { population_cov(v) } else { 0.0 };
    cov_of(&non_paired) + cov_of(&paired)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_cov(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt() / m
}
