// src/muap/sta.rs
//! Spike-triggered averaging

use super::Firings;
use crate::electrodes::{ChannelGrid, GridColumn};
use crate::emgfile::EmgFile;
use crate::error::{EmgErrorBuilder, EmgResult, ProcessingStage};
use ndarray::{s, Array2, ArrayView1};
use rayon::prelude::*;
use tracing::debug;

/// Half window in samples for a window of `timewindow` ms
pub(crate) fn half_window(timewindow: f64, fsamp: f64) -> usize {
    let window = (timewindow / 1000.0 * fsamp).round_ties_even();
    (window / 2.0).round_ties_even() as usize
}

fn check_no_empty_mu(emgfile: &EmgFile, operation: &str) -> EmgResult<()> {
    if let Some(mu) = emgfile.mupulses.iter().position(|p| p.is_empty()) {
        return Err(EmgErrorBuilder::new("muap::sta", operation).processing(
            ProcessingStage::SpikeTriggeredAverage,
            &format!("MU {} has no discharges, remove empty MUs first", mu),
        ));
    }
    Ok(())
}

/// Windows `[p - half, p + half)` of a channel that fit in the recording
fn windows<'a>(
    signal: ArrayView1<'a, f64>,
    pulses: &'a [usize],
    half: usize,
) -> impl Iterator<Item = ArrayView1<'a, f64>> + 'a {
    pulses
        .iter()
        .filter(move |&&p| p >= half && p + half <= signal.len())
        .map(move |&p| signal.slice_move(s![p - half..p + half]))
}

/// Spike-triggered average of every MU on every sorted channel
///
/// Each MUAP spans `2 * half` samples with `half = round(round(tw * fs / 1000) / 2)`.
/// Discharges whose window overflows the recording are skipped; a channel
/// with no usable window is all NaN.
pub fn sta(emgfile: &EmgFile, sorted: &ChannelGrid, firings: Firings, timewindow: f64) -> EmgResult<Vec<ChannelGrid>> {
    check_no_empty_mu(emgfile, "sta")?;
    let half = half_window(timewindow, emgfile.fsamp);

    let muaps: Vec<ChannelGrid> = emgfile
        .mupulses
        .par_iter()
        .map(|pulses| {
            let used = firings.select(pulses);
            sorted.map_columns(|col| {
                let mut data = Array2::from_elem((2 * half, col.channels.len()), f64::NAN);
                for (c, signal) in col.data.columns().into_iter().enumerate() {
                    let mut sum = ndarray::Array1::<f64>::zeros(2 * half);
                    let mut count = 0usize;
                    for window in windows(signal, used, half) {
                        sum += &window;
                        count += 1;
                    }
                    if count > 0 {
                        data.column_mut(c).assign(&(sum / count as f64));
                    }
                }
                GridColumn {
                    channels: col.channels.clone(),
                    data,
                }
            })
        })
        .collect();

    debug!(mus = muaps.len(), half, "computed spike-triggered averages");
    Ok(muaps)
}

/// Individual MUAPs of one matrix column: one `samples x discharges` table per channel
#[derive(Debug, Clone, PartialEq)]
pub struct StColumn {
    pub channels: Vec<usize>,
    pub windows: Vec<Array2<f64>>,
}

/// Individual MUAPs of one MU
#[derive(Debug, Clone, PartialEq)]
pub struct StMuap {
    pub columns: Vec<StColumn>,
}

/// Every discharge-triggered window of every MU, without averaging
pub fn st_muap(emgfile: &EmgFile, sorted: &ChannelGrid, timewindow: f64) -> EmgResult<Vec<StMuap>> {
    check_no_empty_mu(emgfile, "st_muap")?;
    let half = half_window(timewindow, emgfile.fsamp);

    Ok(emgfile
        .mupulses
        .par_iter()
        .map(|pulses| StMuap {
            columns: sorted
                .columns
                .iter()
                .map(|col| StColumn {
                    channels: col.channels.clone(),
                    windows: col
                        .data
                        .columns()
                        .into_iter()
                        .map(|signal| {
                            let found: Vec<_> = windows(signal, pulses, half).collect();
                            let mut table = Array2::zeros((2 * half, found.len()));
                            for (k, w) in found.iter().enumerate() {
                                table.column_mut(k).assign(w);
                            }
                            table
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::muap::test_support::{muap_shape, propagating_file, sorted};

    #[test]
    fn test_half_window() {
        assert_eq!(half_window(50.0, 2048.0), 51);
        // 204.8 -> 205 -> 102.5 rounds to even
        assert_eq!(half_window(100.0, 2048.0), 102);
    }

    #[test]
    fn test_sta_recovers_muap_shape() {
        let pulses = vec![vec![100, 400, 700, 1000, 1300]];
        let file = propagating_file(3, 2, pulses, &[0.0], 1500);
        let grid = sorted(&file, 3, 2);
        let muaps = sta(&file, &grid, Firings::All, 50.0).unwrap();

        assert_eq!(muaps.len(), 1);
        let column = &muaps[0].columns[0];
        assert_eq!(column.data.dim(), (102, 3));
        // Sample `half` is the discharge instant
        for k in [40, 51, 60] {
            let expected = muap_shape(k as f64 - 51.0, 4.0);
            assert!((column.data[[k, 0]] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_sta_skips_overflowing_windows() {
        let pulses = vec![vec![10, 400, 1490]];
        let file = propagating_file(2, 1, pulses, &[0.0], 1500);
        let muaps = sta(&file, &sorted(&file, 2, 1), Firings::All, 50.0).unwrap();
        let expected = muap_shape(0.0, 4.0);
        assert!((muaps[0].columns[0].data[[51, 0]] - expected).abs() < 1e-12);

        let individual = st_muap(&file, &sorted(&file, 2, 1), 50.0).unwrap();
        assert_eq!(individual[0].columns[0].windows[0].ncols(), 1);
    }

    #[test]
    fn test_sta_rejects_empty_mu() {
        let file = propagating_file(2, 1, vec![vec![300], vec![]], &[0.0, 0.0], 600);
        assert!(sta(&file, &sorted(&file, 2, 1), Firings::All, 50.0).is_err());
    }
}
