// src/pic.rs
//! Persistent inward currents: paired motor unit analysis (deltaF)
//!
//! For every pair of MUs the earlier recruited one is the control unit. Its
//! smoothed discharge rate at the recruitment of the test unit minus the rate
//! at the test unit derecruitment is the deltaF of the pair.

use crate::config::DeltaFConfig;
use crate::emgfile::EmgFile;
use crate::error::{EmgErrorBuilder, EmgResult};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// How pair values are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaFAverage {
    /// One value per MU: the mean over the pairs where it is the test unit
    #[default]
    TestUnitAverage,
    /// One value per pair
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaFNormalisation {
    #[default]
    None,
    /// Divide by the control unit rate drop from test recruitment to its own derecruitment
    CtrlMaxDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeltaFParams {
    pub average: DeltaFAverage,
    pub normalisation: DeltaFNormalisation,
    /// Minimum recruitment time difference (s)
    pub recruitment_difference_cutoff: f64,
    /// Minimum correlation of the two smoothed rates
    pub corr_cutoff: f64,
    /// Minimum rate modulation (pps) of the control unit
    pub controlunitmodulation_cutoff: f64,
    /// Set to NaN the pairs failing any cutoff
    pub clean: bool,
}

impl Default for DeltaFParams {
    fn default() -> Self {
        Self::from_config(&DeltaFConfig::default())
    }
}

impl DeltaFParams {
    pub fn from_config(config: &DeltaFConfig) -> Self {
        Self {
            average: DeltaFAverage::default(),
            normalisation: DeltaFNormalisation::default(),
            recruitment_difference_cutoff: config.recruitment_difference_cutoff,
            corr_cutoff: config.corr_cutoff,
            controlunitmodulation_cutoff: config.controlunitmodulation_cutoff,
            clean: config.clean,
        }
    }
}

/// Measures of one MU pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MuPair {
    pub control: usize,
    pub test: usize,
    /// Recruitment difference in s
    pub recruitment_difference: f64,
    /// Correlation of the smoothed rates over the overlap
    pub r: f64,
    pub control_modulation: f64,
    #[serde(rename = "dF")]
    pub df: f64,
}

impl MuPair {
    fn undefined(control: usize, test: usize) -> Self {
        Self {
            control,
            test,
            recruitment_difference: f64::NAN,
            r: f64::NAN,
            control_modulation: f64::NAN,
            df: f64::NAN,
        }
    }
}

/// Which MU or pair a deltaF value refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MuRef {
    /// Not enough MUs for any pair
    None,
    Unit(usize),
    Pair(usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeltaF {
    #[serde(rename = "MU")]
    pub mu: MuRef,
    #[serde(rename = "dF")]
    pub df: f64,
}

/// Recruitment and derecruitment sample of one MU
///
/// Recruitment is taken at the second discharge, where the smoothed rate is
/// first defined.
fn rec_derec(pulses: &[usize]) -> Option<(usize, usize)> {
    match pulses {
        [_, second, .., last] => Some((*second, *last)),
        _ => None,
    }
}

/// Pearson correlation skipping positions where either value is NaN
fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .map(|(&x, &y)| (x, y))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let (ma, mb) = pairs.iter().fold((0.0, 0.0), |(sa, sb), (x, y)| (sa + x / n, sb + y / n));
    let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    cov / (va * vb).sqrt()
}

fn nan_range(values: &[f64]) -> f64 {
    let finite = values.iter().copied().filter(|v| !v.is_nan());
    let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        f64::NAN
    } else {
        hi - lo
    }
}

/// Evaluate every MU pair `(i, j)` with `i < j`
pub fn deltaf_pairs(emgfile: &EmgFile, smoothfits: &[Array1<f64>], params: &DeltaFParams) -> EmgResult<Vec<MuPair>> {
    let err = || EmgErrorBuilder::new("pic", "deltaf_pairs");
    if smoothfits.len() != emgfile.number_of_mus {
        return Err(err().mismatch(
            "smoothfits",
            "one smoothed discharge rate per MU is required",
            emgfile.number_of_mus,
            smoothfits.len(),
        ));
    }
    if let Some(fit) = smoothfits.iter().find(|f| f.len() != emgfile.emg_length) {
        return Err(err().mismatch("smoothfits", "fits must span the whole recording", emgfile.emg_length, fit.len()));
    }

    let fits: Vec<&[f64]> = smoothfits
        .iter()
        .map(|f| f.as_slice().ok_or_else(|| err().invalid_data("smoothfits", "fits must be contiguous")))
        .collect::<EmgResult<_>>()?;
    let events: Vec<Option<(usize, usize)>> = emgfile.mupulses.iter().map(|p| rec_derec(p)).collect();

    let mut pairs = Vec::new();
    for mu1 in 0..emgfile.number_of_mus {
        for mu2 in (mu1 + 1)..emgfile.number_of_mus {
            let (Some((rc1, dr1)), Some((rc2, dr2))) = (events[mu1], events[mu2]) else {
                trace!(mu1, mu2, "pair skipped, a MU has fewer than two discharges");
                pairs.push(MuPair::undefined(mu1, mu2));
                continue;
            };

            // Earlier recruitment wins, later derecruitment breaks ties
            let mu1_controls = rc1 < rc2 || (rc1 == rc2 && dr1 > dr2);
            let (control, test, ctrl_drcrt, test_rcrt, test_drcrt) = if mu1_controls {
                (mu1, mu2, dr1, rc2, dr2.min(dr1))
            } else {
                (mu2, mu1, dr2, rc1, dr1.min(dr2))
            };

            let overlap = rc1.max(rc2)..dr1.min(dr2);
            if overlap.len() < 2 {
                pairs.push(MuPair::undefined(control, test));
                continue;
            }

            let ctrl = fits[control];
            let r = pearson(&fits[mu1][overlap.clone()], &fits[mu2][overlap]);
            let recruitment_difference = rc1.abs_diff(rc2) as f64 / emgfile.fsamp;
            let control_modulation = nan_range(&ctrl[test_rcrt..test_drcrt]);
            let mut df = ctrl[test_rcrt] - ctrl[test_drcrt];
            if params.normalisation == DeltaFNormalisation::CtrlMaxDesc {
                df /= ctrl[test_rcrt] - ctrl[ctrl_drcrt];
            }

            if params.clean
                && !(recruitment_difference > params.recruitment_difference_cutoff
                    && r > params.corr_cutoff
                    && control_modulation > params.controlunitmodulation_cutoff)
            {
                trace!(control, test, recruitment_difference, r, control_modulation, "pair excluded");
                df = f64::NAN;
            }
            pairs.push(MuPair { control, test, recruitment_difference, r, control_modulation, df });
        }
    }
    Ok(pairs)
}

/// deltaF per test unit or per pair
///
/// `smoothfits` holds one smoothed discharge rate per MU spanning the whole
/// recording, as produced by [`crate::tools::compute_svr`]. A file with fewer
/// than two MUs yields a single NaN entry.
pub fn compute_deltaf(emgfile: &EmgFile, smoothfits: &[Array1<f64>], params: &DeltaFParams) -> EmgResult<Vec<DeltaF>> {
    if emgfile.number_of_mus < 2 {
        debug!(n_mus = emgfile.number_of_mus, "deltaF needs at least two MUs");
        return Ok(vec![DeltaF { mu: MuRef::None, df: f64::NAN }]);
    }
    let pairs = deltaf_pairs(emgfile, smoothfits, params)?;

    let result = match params.average {
        DeltaFAverage::All => pairs
            .iter()
            .map(|p| DeltaF { mu: MuRef::Pair(p.control.min(p.test), p.control.max(p.test)), df: p.df })
            .collect(),
        DeltaFAverage::TestUnitAverage => (0..emgfile.number_of_mus)
            .map(|mu| {
                let values: Vec<f64> = pairs.iter().filter(|p| p.test == mu && !p.df.is_nan()).map(|p| p.df).collect();
                let df = if values.is_empty() {
                    f64::NAN
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                };
                DeltaF { mu: MuRef::Unit(mu), df }
            })
            .collect(),
    };
    Ok(result)
}
