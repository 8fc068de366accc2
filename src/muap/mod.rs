// src/muap/mod.rs
//! Motor unit action potentials
//!
//! MUAP shapes are obtained by spike-triggered averaging of the sorted raw
//! EMG (monopolar or differential). They are the basis for tracking MUs
//! across recordings, removing duplicates and estimating conduction
//! velocity.

pub mod cv;
pub mod differential;
pub mod sta;
pub mod tracking;

pub use cv::{estimate_cv_via_mle, estimate_mus_cv, xcc_sta, CvSelection, CvChannels, MuCv, MusCvParams};
pub use differential::{diff, double_diff};
pub use sta::{st_muap, sta, StColumn, StMuap};
pub use tracking::{
    align_by_xcorr, remove_duplicates_between, tracking, tracking_from_muaps, TrackingMatch, TrackingParams, Which,
};

use serde::{Deserialize, Serialize};

/// Discharges used for averaging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Firings {
    All,
    /// Discharge numbers in `[start, end)`, clipped to the available ones
    Range(usize, usize),
}

impl Default for Firings {
    fn default() -> Self {
        let (start, end) = crate::config::constants::muap::DEFAULT_STA_FIRINGS;
        Firings::Range(start, end)
    }
}

impl Firings {
    pub(crate) fn select<'a>(&self, pulses: &'a [usize]) -> &'a [usize] {
        match *self {
            Firings::All => pulses,
            Firings::Range(start, end) => {
                let end = end.min(pulses.len());
                &pulses[start.min(end)..end]
            }
        }
    }
}

/// Spatial filter applied to the sorted channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Derivation {
    Mono,
    #[default]
    Sd,
    Dd,
}

impl std::str::FromStr for Derivation {
    type Err = crate::error::EmgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mono" => Ok(Derivation::Mono),
            "sd" => Ok(Derivation::Sd),
            "dd" => Ok(Derivation::Dd),
            other => Err(crate::error::EmgErrorBuilder::new("muap", "derivation")
                .invalid_data("derivation", &format!("'{}' is not one of mono, sd, dd", other))),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::electrodes::{ChannelGrid, GridColumn};
    use crate::emgfile::{EmgFile, Source};
    use ndarray::Array2;

    /// Biphasic wave centred on sample 0, width in samples
    pub fn muap_shape(t: f64, width: f64) -> f64 {
        let x = t / width;
        -x * (-x * x).exp()
    }

    /// Recording whose MUs fire a biphasic MUAP travelling down every column
    ///
    /// `delays` holds, per MU, the delay in samples between adjacent rows.
    pub fn propagating_file(rows: usize, cols: usize, pulses: Vec<Vec<usize>>, delays: &[f64], len: usize) -> EmgFile {
        let mut raw = Array2::zeros((len, rows * cols));
        for (mu, mu_pulses) in pulses.iter().enumerate() {
            let amplitude = 1.0 + mu as f64;
            for &p in mu_pulses {
                for ch in 0..rows * cols {
                    let row = ch % rows;
                    let centre = p as f64 + row as f64 * delays[mu];
                    let lo = (centre as i64 - 40).max(0) as usize;
                    let hi = ((centre as usize) + 40).min(len);
                    for i in lo..hi {
                        raw[[i, ch]] += amplitude * muap_shape(i as f64 - centre, 4.0 + mu as f64 * 3.0);
                    }
                }
            }
        }
        EmgFile::new(Source::CustomCsv, "muap", raw, 2048.0, 8.0).with_mupulses(pulses).unwrap()
    }

    pub fn sorted(file: &EmgFile, rows: usize, cols: usize) -> ChannelGrid {
        crate::electrodes::sort_rawemg(file, None, 180, true, Some(rows), Some(cols)).unwrap()
    }

    pub fn single_column(values: Array2<f64>) -> ChannelGrid {
        ChannelGrid {
            columns: vec![GridColumn {
                channels: (0..values.ncols()).collect(),
                data: values,
            }],
        }
    }
}
