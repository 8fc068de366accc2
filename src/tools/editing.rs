// src/tools/editing.rs
//! Editing of the MU set and of the recording length

use crate::emgfile::{EmgFile, RefSigFile};
use crate::error::{EmgErrorBuilder, EmgResult};
use crate::mathtools::compute_sil;
use ndarray::{s, Array1, Axis};
use tracing::{debug, warn};

/// What happens to ACCURACY when a file is resized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAccuracy {
    /// Recompute the SIL on the resized IPTS
    Recalculate { ignore_negative_ipts: bool },
    /// Keep the values of the full recording
    Maintain,
}

impl Default for ResizeAccuracy {
    fn default() -> Self {
        ResizeAccuracy::Recalculate {
            ignore_negative_ipts: false,
        }
    }
}

/// Behaviour of [`delete_mus`] on files holding a single MU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfSingleMu {
    /// Leave the file untouched and warn
    #[default]
    Ignore,
    /// Delete anyway, leaving a file without MUs
    Remove,
}

/// Clamp a requested area to `[0, len - 1]`
fn clamp_area(start: i64, end: i64, len: usize) -> EmgResult<(usize, usize)> {
    let err = || EmgErrorBuilder::new("tools::editing", "resize");
    if len == 0 {
        return Err(err().invalid_data("area", "the recording is empty"));
    }
    let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
    let last = len as i64 - 1;
    let lo = lo.clamp(0, last) as usize;
    let hi = hi.clamp(0, last) as usize;
    Ok((lo, hi))
}

/// Keep only the samples in `[start, end]`
///
/// The area is clamped to the recording and may be given in any order.
/// Discharges in `[start, end)` are kept and shifted to the new origin.
/// Returns the resized file with the area actually used.
pub fn resize_emgfile(
    emgfile: &EmgFile,
    start: i64,
    end: i64,
    accuracy: ResizeAccuracy,
) -> EmgResult<(EmgFile, usize, usize)> {
    let (start, end) = clamp_area(start, end, emgfile.emg_length)?;
    let rows = start..end + 1;

    let mut resized = emgfile.clone();
    resized.raw_signal = emgfile.raw_signal.slice(s![rows.clone(), ..]).to_owned();
    if emgfile.has_ref_signal() {
        let last = emgfile.ref_signal.len().min(end + 1);
        resized.ref_signal = emgfile.ref_signal.slice(s![start.min(last)..last]).to_owned();
    }
    if emgfile.has_ipts() {
        resized.ipts = emgfile.ipts.slice(s![rows.clone(), ..]).to_owned();
    } else {
        resized.ipts = ndarray::Array2::zeros((end + 1 - start, 0));
    }
    resized.extras = emgfile.extras.slice_rows(start, end + 1);
    resized.emg_length = end + 1 - start;

    let mupulses: Vec<Vec<usize>> = emgfile
        .mupulses
        .iter()
        .map(|pulses| {
            pulses
                .iter()
                .filter(|&&p| p >= start && p < end)
                .map(|p| p - start)
                .collect()
        })
        .collect();
    resized.set_mupulses(mupulses)?;

    if let ResizeAccuracy::Recalculate { ignore_negative_ipts } = accuracy {
        if resized.has_ipts() {
            resized.accuracy = resized
                .mupulses
                .iter()
                .enumerate()
                .map(|(mu, pulses)| {
                    let source = resized.ipts.column(mu).to_vec();
                    compute_sil(&source, pulses, ignore_negative_ipts)
                })
                .collect();
        } else if resized.number_of_mus > 0 {
            warn!("IPTS not available, accuracy of the full recording is kept");
        }
    }

    debug!(start, end, length = resized.emg_length, "resized emgfile");
    Ok((resized, start, end))
}

/// Keep only the reference signal samples in `[start, end]`
pub fn resize_refsig(refsig: &RefSigFile, start: i64, end: i64) -> EmgResult<(RefSigFile, usize, usize)> {
    let (start, end) = clamp_area(start, end, refsig.ref_signal.len())?;
    let mut resized = refsig.clone();
    resized.ref_signal = refsig.ref_signal.slice(s![start..end + 1]).to_owned();
    resized.extras = refsig.extras.slice_rows(start, end + 1);
    Ok((resized, start, end))
}

/// Remove the listed MUs
///
/// With [`IfSingleMu::Ignore`] a file that holds at most one MU is returned
/// unchanged. Unknown MU numbers are an error.
pub fn delete_mus(emgfile: &EmgFile, mus: &[usize], if_single_mu: IfSingleMu) -> EmgResult<EmgFile> {
    if if_single_mu == IfSingleMu::Ignore && emgfile.number_of_mus <= 1 {
        warn!("only 1 MU in the file, it has not been removed; use IfSingleMu::Remove to delete it");
        return Ok(emgfile.clone());
    }
    if let Some(&bad) = mus.iter().find(|&&mu| mu >= emgfile.number_of_mus) {
        return Err(EmgErrorBuilder::new("tools::editing", "delete_mus").mismatch(
            "munumber",
            "MU does not exist",
            format!("< {}", emgfile.number_of_mus),
            bad,
        ));
    }

    let keep: Vec<usize> = (0..emgfile.number_of_mus).filter(|mu| !mus.contains(mu)).collect();
    Ok(select_mus(emgfile, &keep))
}

/// Remove the MUs without discharges
pub fn delete_empty_mus(emgfile: &EmgFile) -> EmgResult<EmgFile> {
    let empty: Vec<usize> = emgfile
        .mupulses
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_empty())
        .map(|(mu, _)| mu)
        .collect();
    if empty.is_empty() {
        return Ok(emgfile.clone());
    }
    debug!(?empty, "deleting empty MUs");
    delete_mus(emgfile, &empty, IfSingleMu::Remove)
}

/// Order MUs by their first discharge, empty MUs last
pub fn sort_mus(emgfile: &EmgFile) -> EmgFile {
    if emgfile.number_of_mus <= 1 {
        return emgfile.clone();
    }
    let mut order: Vec<usize> = (0..emgfile.number_of_mus).collect();
    order.sort_by_key(|&mu| emgfile.mupulses[mu].first().copied().unwrap_or(usize::MAX));
    select_mus(emgfile, &order)
}

/// Reorder or subset the per-MU fields
pub(crate) fn select_mus(emgfile: &EmgFile, mus: &[usize]) -> EmgFile {
    let mut out = emgfile.clone();
    out.mupulses = mus.iter().map(|&mu| emgfile.mupulses[mu].clone()).collect();
    out.number_of_mus = mus.len();
    out.binary_mus_firing = emgfile.binary_mus_firing.select(Axis(1), mus);
    if emgfile.has_ipts() {
        out.ipts = emgfile.ipts.select(Axis(1), mus);
    }
    if !emgfile.accuracy.is_empty() {
        out.accuracy = mus.iter().map(|&mu| emgfile.accuracy[mu]).collect::<Array1<f64>>();
    }
    out
}
