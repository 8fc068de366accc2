// src/muap/tracking.rs
//! Tracking of MUs across recordings and removal of duplicates

use super::{diff, double_diff, sta, Derivation, Firings};
use crate::config::constants::muap::{ALIGN_FINAL_DURATION, DUPLICATES_THRESHOLD, STA_TIMEWINDOW_MS, TRACKING_THRESHOLD};
use crate::config::MuapConfig;
use crate::electrodes::{sort_rawemg, ChannelGrid};
use crate::emgfile::EmgFile;
use crate::error::{EmgErrorBuilder, EmgResult, ProcessingStage};
use crate::mathtools::norm_twod_xcorr;
use crate::processing::correlate2d_full;
use crate::tools::{delete_mus, IfSingleMu};
use ndarray::{s, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Parameters of [`tracking`] and [`remove_duplicates_between`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingParams {
    pub firings: Firings,
    pub derivation: Derivation,
    /// MUAP duration in ms; averaging uses twice this window before alignment
    pub timewindow: f64,
    pub threshold: f64,
    /// Electrode code for sorting, `None` for a custom `n_rows x n_cols` grid
    pub matrixcode: Option<String>,
    pub orientation: u16,
    pub n_rows: Option<usize>,
    pub n_cols: Option<usize>,
    /// Drop pairs below the threshold
    pub exclude_belowthreshold: bool,
    /// Keep only the best match of each MU in both files
    pub filter: bool,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            firings: Firings::All,
            derivation: Derivation::Sd,
            timewindow: STA_TIMEWINDOW_MS,
            threshold: TRACKING_THRESHOLD,
            matrixcode: Some("GR08MM1305".to_string()),
            orientation: 180,
            n_rows: None,
            n_cols: None,
            exclude_belowthreshold: true,
            filter: true,
        }
    }
}

impl TrackingParams {
    /// Defaults for duplicate removal, which needs a stricter threshold
    pub fn duplicates() -> Self {
        Self {
            threshold: DUPLICATES_THRESHOLD,
            ..Self::default()
        }
    }

    /// Defaults overridden by the configured MUAP settings
    pub fn from_config(config: &MuapConfig) -> Self {
        Self {
            timewindow: config.sta_timewindow,
            threshold: config.tracking_threshold,
            ..Self::default()
        }
    }
}

/// A pair of MUs with their MUAP similarity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackingMatch {
    pub mu_file1: usize,
    pub mu_file2: usize,
    pub xcc: f64,
}

/// Which file loses a duplicated MU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Which {
    /// The file with more MUs (file 1 on a tie)
    #[default]
    MuNumber,
    /// Pair by pair, the file whose MU has the lower accuracy
    Accuracy,
}

/// Align two MUAP sets on the lag of their 2D cross-correlation
///
/// The lag is the median, over channels, of the row lag with the highest
/// correlation. After shifting, both sets are trimmed to
/// `round(samples * finalduration)` samples around their centre.
pub fn align_by_xcorr(sta1: &ChannelGrid, sta2: &ChannelGrid, finalduration: f64) -> EmgResult<(ChannelGrid, ChannelGrid)> {
    let (_, df1) = sta1.unpack();
    let (_, df2) = sta2.unpack();
    let n = df1.nrows();
    if n == 0 || df2.nrows() != n {
        return Err(EmgErrorBuilder::new("muap::tracking", "align_by_xcorr").processing(
            ProcessingStage::Tracking,
            "MUAPs must be non-empty and of equal duration",
        ));
    }

    let valid1 = sta1.unpack_valid();
    let valid2 = sta2.unpack_valid();
    let full = correlate2d_full(valid1.view(), valid2.view());
    let (n2, c1, c2) = (valid2.nrows(), valid1.ncols(), valid2.ncols());

    // "same" region: as many rows and columns as the first input, centred
    let row_start = (n2 - 1) / 2;
    let col_start = c2.saturating_sub(1) / 2;
    let mut lags: Vec<f64> = (col_start..(col_start + c1).min(full.ncols()))
        .map(|c| {
            let column = full.slice(s![row_start..row_start + n, c]);
            let best = column
                .iter()
                .enumerate()
                .fold(0, |best, (i, v)| if *v > column[best] { i } else { best });
            (row_start + best) as f64 - (n2 - 1) as f64
        })
        .collect();
    let lag = median(&mut lags);

    let final_samples = (n as f64 * finalduration).round() as usize;
    let limit = final_samples as f64 / 2.0;
    let lag = lag.clamp(-limit, limit);
    let shift = (lag.abs().ceil() as usize).min(n - 1);

    let (cut1, cut2) = if lag > 0.0 {
        (df1.slice(s![shift.., ..]), df2.slice(s![..n - shift, ..]))
    } else {
        (df1.slice(s![..n - shift, ..]), df2.slice(s![shift.., ..]))
    };

    let len = cut1.nrows();
    let start = (len.saturating_sub(final_samples) as f64 / 2.0).round() as usize;
    let end = len - start;
    let aligned1 = sta1.pack_like(cut1.slice(s![start..end, ..]).to_owned())?;
    let aligned2 = sta2.pack_like(cut2.slice(s![start..end, ..]).to_owned())?;
    Ok((aligned1, aligned2))
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Track MUs between two recordings of the same muscle
///
/// Both files are sorted, derived and averaged over a window twice as long
/// as `timewindow`. Every pair of MUs is aligned and compared with the
/// normalised 2D cross-correlation of their MUAPs.
pub fn tracking(emgfile1: &EmgFile, emgfile2: &EmgFile, params: &TrackingParams) -> EmgResult<Vec<TrackingMatch>> {
    let muaps = |file: &EmgFile| -> EmgResult<Vec<ChannelGrid>> {
        let sorted = sort_rawemg(
            file,
            params.matrixcode.as_deref(),
            params.orientation,
            true,
            params.n_rows,
            params.n_cols,
        )?;
        let derived = match params.derivation {
            Derivation::Mono => sorted,
            Derivation::Sd => diff(&sorted),
            Derivation::Dd => double_diff(&sorted),
        };
        sta(file, &derived, params.firings, params.timewindow * 2.0)
    };

    let sta1 = muaps(emgfile1)?;
    let sta2 = muaps(emgfile2)?;
    tracking_from_muaps(&sta1, &sta2, true, params)
}

/// Track MUs from MUAPs computed elsewhere
///
/// With `align = false` the MUAPs are compared as given.
pub fn tracking_from_muaps(
    sta1: &[ChannelGrid],
    sta2: &[ChannelGrid],
    align: bool,
    params: &TrackingParams,
) -> EmgResult<Vec<TrackingMatch>> {
    info!(mus_file1 = sta1.len(), mus_file2 = sta2.len(), "tracking started");

    let per_mu: Vec<Vec<TrackingMatch>> = (0..sta1.len())
        .into_par_iter()
        .map(|mu1| {
            let mut found = Vec::new();
            for mu2 in 0..sta2.len() {
                let (a, b): (Array2<f64>, Array2<f64>) = if align {
                    let (a1, a2) = align_by_xcorr(&sta1[mu1], &sta2[mu2], ALIGN_FINAL_DURATION)?;
                    (a1.unpack_valid(), a2.unpack_valid())
                } else {
                    (sta1[mu1].unpack_valid(), sta2[mu2].unpack_valid())
                };
                let (_, xcc) = norm_twod_xcorr(a.view(), b.view());
                if !params.exclude_belowthreshold || xcc >= params.threshold {
                    found.push(TrackingMatch {
                        mu_file1: mu1,
                        mu_file2: mu2,
                        xcc,
                    });
                }
            }
            Ok(found)
        })
        .collect::<EmgResult<_>>()?;

    let matches: Vec<TrackingMatch> = per_mu.into_iter().flatten().collect();
    let matches = if params.filter { best_matches(matches) } else { matches };
    debug!(pairs = matches.len(), filtered = params.filter, "tracking finished");
    Ok(matches)
}

/// Keep the best match of each MU of file 1, then of each MU of file 2
fn best_matches(matches: Vec<TrackingMatch>) -> Vec<TrackingMatch> {
    let keep_best = |items: Vec<TrackingMatch>, key: fn(&TrackingMatch) -> usize| {
        let mut best: BTreeMap<usize, TrackingMatch> = BTreeMap::new();
        for m in items {
            best.entry(key(&m))
                .and_modify(|current| {
                    if m.xcc > current.xcc {
                        *current = m;
                    }
                })
                .or_insert(m);
        }
        best.into_values().collect::<Vec<_>>()
    };

    let mut result = keep_best(keep_best(matches, |m| m.mu_file1), |m| m.mu_file2);
    result.sort_by_key(|m| m.mu_file1);
    result
}

/// Remove MUs that appear in both recordings
///
/// Returns both files after removal together with the duplicate pairs.
pub fn remove_duplicates_between(
    emgfile1: &EmgFile,
    emgfile2: &EmgFile,
    params: &TrackingParams,
    which: Which,
) -> EmgResult<(EmgFile, EmgFile, Vec<TrackingMatch>)> {
    let params = TrackingParams {
        exclude_belowthreshold: true,
        ..params.clone()
    };
    let duplicates = tracking(emgfile1, emgfile2, &params)?;

    let (remove1, remove2): (Vec<usize>, Vec<usize>) = match which {
        Which::MuNumber => {
            if emgfile1.number_of_mus >= emgfile2.number_of_mus {
                (duplicates.iter().map(|m| m.mu_file1).collect(), Vec::new())
            } else {
                (Vec::new(), duplicates.iter().map(|m| m.mu_file2).collect())
            }
        }
        Which::Accuracy => {
            if emgfile1.accuracy.len() != emgfile1.number_of_mus || emgfile2.accuracy.len() != emgfile2.number_of_mus {
                return Err(EmgErrorBuilder::new("muap::tracking", "remove_duplicates_between")
                    .invalid_data("ACCURACY", "both files need one accuracy value per MU"));
            }
            let mut r1 = Vec::new();
            let mut r2 = Vec::new();
            for m in &duplicates {
                if emgfile1.accuracy[m.mu_file1] <= emgfile2.accuracy[m.mu_file2] {
                    r1.push(m.mu_file1);
                } else {
                    r2.push(m.mu_file2);
                }
            }
            (r1, r2)
        }
    };

    info!(from_file1 = remove1.len(), from_file2 = remove2.len(), "removing duplicated MUs");
    let cleaned1 = delete_mus(emgfile1, &remove1, IfSingleMu::Remove)?;
    let cleaned2 = delete_mus(emgfile2, &remove2, IfSingleMu::Remove)?;
    Ok((cleaned1, cleaned2, duplicates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::muap::test_support::{muap_shape, propagating_file, single_column};
    use ndarray::Array1;

    fn custom_params() -> TrackingParams {
        TrackingParams {
            matrixcode: None,
            n_rows: Some(4),
            n_cols: Some(2),
            ..TrackingParams::default()
        }
    }

    fn pulses(offset: usize) -> Vec<usize> {
        (0..12).map(|k| 300 + offset + k * 400).collect()
    }

    #[test]
    fn test_align_recovers_shift() {
        let shape = |shift: f64| {
            Array2::from_shape_fn((100, 3), |(i, c)| (c + 1) as f64 * muap_shape(i as f64 - 50.0 - shift, 4.0))
        };
        let a = single_column(shape(6.0));
        let b = single_column(shape(0.0));
        let (a1, b1) = align_by_xcorr(&a, &b, 0.5).unwrap();

        assert_eq!(a1.n_samples(), 50);
        assert_eq!(b1.n_samples(), 50);
        let diff = &a1.columns[0].data - &b1.columns[0].data;
        assert!(diff.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_tracking_finds_same_units() {
        // Same two MUs, discharging at different times in each recording
        let file1 = propagating_file(4, 2, vec![pulses(0), pulses(200)], &[1.0, 2.0], 5200);
        let file2 = propagating_file(4, 2, vec![pulses(30), pulses(230)], &[1.0, 2.0], 5200);

        let matches = tracking(&file1, &file2, &custom_params()).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!((matches[0].mu_file1, matches[0].mu_file2), (0, 0));
        assert_eq!((matches[1].mu_file1, matches[1].mu_file2), (1, 1));
        assert!(matches.iter().all(|m| m.xcc > 0.99));
    }

    #[test]
    fn test_unfiltered_tracking_reports_all_pairs() {
        let file1 = propagating_file(4, 2, vec![pulses(0), pulses(200)], &[1.0, 2.0], 5200);
        let params = TrackingParams {
            exclude_belowthreshold: false,
            filter: false,
            ..custom_params()
        };
        let matches = tracking(&file1, &file1, &params).unwrap();
        assert_eq!(matches.len(), 4);
    }

    #[test]
    fn test_best_matches_is_exclusive() {
        let m = |a, b, x| TrackingMatch { mu_file1: a, mu_file2: b, xcc: x };
        let filtered = best_matches(vec![m(0, 0, 0.95), m(0, 1, 0.85), m(1, 0, 0.9), m(2, 1, 0.99)]);
        assert_eq!(filtered, vec![m(0, 0, 0.95), m(2, 1, 0.99)]);
    }

    #[test]
    fn test_remove_duplicates_by_accuracy() {
        let file1 = propagating_file(4, 2, vec![pulses(0), pulses(200)], &[1.0, 2.0], 5200)
            .with_accuracy(Array1::from(vec![0.95, 0.80]));
        let file2 = propagating_file(4, 2, vec![pulses(30), pulses(230)], &[1.0, 2.0], 5200)
            .with_accuracy(Array1::from(vec![0.90, 0.85]));

        let params = TrackingParams { threshold: 0.9, ..custom_params() };
        let (clean1, clean2, duplicates) = remove_duplicates_between(&file1, &file2, &params, Which::Accuracy).unwrap();
        assert_eq!(duplicates.len(), 2);
        assert_eq!(clean1.number_of_mus, 1);
        assert_eq!(clean2.number_of_mus, 1);
        assert_eq!(clean1.accuracy.to_vec(), vec![0.95]);
        assert_eq!(clean2.accuracy.to_vec(), vec![0.85]);

        let (clean1, clean2, _) = remove_duplicates_between(&file1, &file2, &params, Which::MuNumber).unwrap();
        assert_eq!(clean1.number_of_mus, 0);
        assert_eq!(clean2.number_of_mus, 2);
    }
}
