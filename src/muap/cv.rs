// src/muap/cv.rs
//! Conduction velocity of MUs from their MUAPs

use super::{double_diff, sta, Firings};
use crate::config::constants::muap::STA_TIMEWINDOW_MS;
use crate::electrodes::ChannelGrid;
use crate::emgfile::EmgFile;
use crate::error::{EmgErrorBuilder, EmgResult, ProcessingStage};
use crate::mathtools::{find_mle_teta, mle_cv_est, norm_xcorr, XcorrOut};
use ndarray::{s, ArrayView2};
use serde::Serialize;
use tracing::{debug, warn};

/// Correlation of each channel with the previous one in its column
///
/// Indexed as `[mu][column][channel]`; the first channel of every column has
/// no predecessor and is NaN.
pub fn xcc_sta(sta: &[ChannelGrid]) -> Vec<Vec<Vec<f64>>> {
    sta.iter()
        .map(|muap| {
            muap.columns
                .iter()
                .map(|col| {
                    (0..col.channels.len())
                        .map(|c| {
                            if c == 0 {
                                return f64::NAN;
                            }
                            let this = col.data.column(c).to_vec();
                            let previous = col.data.column(c - 1).to_vec();
                            norm_xcorr(&this, &previous, XcorrOut::Max)
                        })
                        .collect()
                })
                .collect()
        })
        .collect()
}

/// Conduction velocity (m/s) of a MUAP propagating along `signal` (`samples x channels`)
///
/// The starting delay comes from channels 1 and 2, or 0 and 1 when fewer
/// than four channels are given. All channels enter the likelihood.
pub fn estimate_cv_via_mle(emgfile: &EmgFile, signal: ArrayView2<f64>) -> EmgResult<f64> {
    let err = || EmgErrorBuilder::new("muap::cv", "estimate_cv_via_mle");
    let (samples, channels) = signal.dim();
    if channels < 2 {
        return Err(err().processing(ProcessingStage::ConductionVelocity, "at least two channels are required"));
    }
    if samples < channels {
        return Err(err().processing(
            ProcessingStage::ConductionVelocity,
            "the number of signals exceeds the number of samples, channels must be columns",
        ));
    }
    if signal.iter().any(|v| v.is_nan()) {
        return Err(err().invalid_data("signal", "channels contain NaN values"));
    }

    let sig = signal.t();
    let (a, b) = if channels > 3 { (1, 2) } else { (0, 1) };
    let teta = find_mle_teta(&sig.row(a).to_vec(), &sig.row(b).to_vec(), emgfile.ied, emgfile.fsamp)?;
    let (cv, teta) = mle_cv_est(sig, teta, emgfile.ied, emgfile.fsamp);
    debug!(cv, teta, channels, "estimated conduction velocity");
    Ok(cv.abs())
}

/// Channels of one MU used for its conduction velocity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CvChannels {
    pub mu: usize,
    pub column: usize,
    /// First and last channel index within the column, inclusive
    pub from_row: usize,
    pub to_row: usize,
}

/// How [`estimate_mus_cv`] picks the channels of each MU
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CvSelection {
    /// For each MU, the column with the highest mean adjacent-channel
    /// correlation, over all its valid channels
    #[default]
    Auto,
    Manual(Vec<CvChannels>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusCvParams {
    pub firings: Firings,
    pub timewindow: f64,
    pub selection: CvSelection,
}

impl Default for MusCvParams {
    fn default() -> Self {
        Self {
            firings: Firings::default(),
            timewindow: STA_TIMEWINDOW_MS,
            selection: CvSelection::Auto,
        }
    }
}

/// Conduction velocity estimate of one MU
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MuCv {
    pub channels: CvChannels,
    pub cv: f64,
    /// Mean RMS of the channels used
    pub rms: f64,
    /// Mean correlation between the adjacent channels used
    pub xcc: f64,
}

/// Conduction velocity of every MU from its double differential MUAPs
pub fn estimate_mus_cv(emgfile: &EmgFile, sorted: &ChannelGrid, params: &MusCvParams) -> EmgResult<Vec<MuCv>> {
    let dd = double_diff(sorted);
    let muaps = sta(emgfile, &dd, params.firings, params.timewindow)?;
    let xcc = xcc_sta(&muaps);

    let selections: Vec<CvChannels> = match &params.selection {
        CvSelection::Manual(list) => list.clone(),
        CvSelection::Auto => (0..muaps.len())
            .filter_map(|mu| {
                let picked = auto_select(mu, &muaps[mu], &xcc[mu]);
                if picked.is_none() {
                    warn!(mu, "no column with two valid channels, MU skipped");
                }
                picked
            })
            .collect(),
    };

    selections
        .into_iter()
        .map(|sel| {
            let err = || EmgErrorBuilder::new("muap::cv", "estimate_mus_cv");
            let column = muaps
                .get(sel.mu)
                .and_then(|m| m.columns.get(sel.column))
                .ok_or_else(|| err().invalid_data("selection", &format!("MU {} column {} does not exist", sel.mu, sel.column)))?;
            if sel.from_row >= sel.to_row || sel.to_row >= column.channels.len() {
                return Err(err().invalid_data("selection", "row range must hold two or more channels of the column"));
            }

            let signal = column.data.slice(s![.., sel.from_row..=sel.to_row]);
            let cv = estimate_cv_via_mle(emgfile, signal)?;
            let rms = signal
                .columns()
                .into_iter()
                .map(|c| (c.iter().map(|v| v * v).sum::<f64>() / c.len() as f64).sqrt())
                .sum::<f64>()
                / signal.ncols() as f64;
            let xccs: Vec<f64> = xcc[sel.mu][sel.column][sel.from_row + 1..=sel.to_row]
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .collect();
            let mean_xcc = xccs.iter().sum::<f64>() / xccs.len() as f64;

            Ok(MuCv {
                channels: sel,
                cv,
                rms,
                xcc: mean_xcc,
            })
        })
        .collect()
}

/// Longest run of valid channels in the column with the best mean XCC
fn auto_select(mu: usize, muap: &ChannelGrid, xcc: &[Vec<f64>]) -> Option<CvChannels> {
    let mut best: Option<(f64, CvChannels)> = None;
    for (c, col) in muap.columns.iter().enumerate() {
        let valid = col.valid_channels();
        let (Some(&first), Some(&last)) = (valid.first(), valid.last()) else {
            continue;
        };
        if last <= first || valid.len() != last - first + 1 {
            continue;
        }
        let values: Vec<f64> = xcc[c][first + 1..=last].iter().copied().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        if best.map_or(true, |(score, _)| mean > score) {
            best = Some((
                mean,
                CvChannels {
                    mu,
                    column: c,
                    from_row: first,
                    to_row: last,
                },
            ));
        }
    }
    best.map(|(_, sel)| sel)
}
