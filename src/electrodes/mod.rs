// src/electrodes/mod.rs
//! Electrode matrices and channel sorting
//!
//! OTB matrices are wired so that channel numbers do not follow the physical
//! layout. [`sort_rawemg`] rearranges the raw signal into matrix columns so
//! that neighbouring positions are neighbouring electrodes.

pub mod grid;

pub use grid::{ChannelGrid, GridColumn};

use crate::emgfile::EmgFile;
use crate::error::{EmgErrorBuilder, EmgResult};
use ndarray::{Array2, Axis};
use tracing::debug;

/// Sorted raw EMG, one entry per matrix column
pub type SortedChannels = ChannelGrid;

/// OTB matrix codes with a known inter-electrode distance
pub const OTB_ELECTRODES: [&str; 9] = [
    "GR04MM1305",
    "GR08MM1305",
    "GR100ML1305",
    "GR10MM0804",
    "GR10MM0808",
    "HD04MM1305",
    "HD08MM1305",
    "HD10MM0804",
    "HD10MM0808",
];

/// Inter-electrode distance in mm of an OTB matrix
pub fn ied_of(code: &str) -> Option<f64> {
    match code {
        "GR04MM1305" | "HD04MM1305" => Some(4.0),
        "GR08MM1305" | "HD08MM1305" => Some(8.0),
        "GR100ML1305" => Some(2.5),
        "GR10MM0804" | "GR10MM0808" | "HD10MM0804" | "HD10MM0808" => Some(10.0),
        _ => None,
    }
}

/// Number of electrodes of an OTB matrix
pub fn electrodes_of(code: &str) -> Option<usize> {
    match code {
        "GR10MM0804" | "HD10MM0804" => Some(32),
        c if ied_of(c).is_some() => Some(64),
        _ => None,
    }
}

/// Matrix orientation relative to the muscle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Deg0,
    Deg180,
}

impl TryFrom<u16> for Orientation {
    type Error = crate::error::EmgError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Orientation::Deg0),
            180 => Ok(Orientation::Deg180),
            other => Err(EmgErrorBuilder::new("electrodes", "orientation")
                .invalid_data("orientation", &format!("{} is not 0 or 180", other))),
        }
    }
}

/// Channel order of a matrix, `None` at the empty corner
fn channel_order(code: &str, orientation: Orientation) -> Option<(Vec<Option<usize>>, usize, usize)> {
    let asc = |from: usize, to: usize| (from..=to).map(Some).collect::<Vec<_>>();
    let desc = |from: usize, to: usize| (to..=from).rev().map(Some).collect::<Vec<_>>();

    match (code, orientation) {
        ("GR08MM1305" | "GR04MM1305", Orientation::Deg0) => {
            let mut order = desc(63, 51);
            order.extend(asc(38, 50));
            order.extend(desc(37, 25));
            order.extend(asc(12, 24));
            order.extend(desc(11, 0));
            order.push(None);
            Some((order, 13, 5))
        }
        ("GR08MM1305" | "GR04MM1305", Orientation::Deg180) => {
            let mut order = vec![None];
            order.extend(asc(0, 11));
            order.extend(desc(24, 12));
            order.extend(asc(25, 37));
            order.extend(desc(50, 38));
            order.extend(asc(51, 63));
            Some((order, 13, 5))
        }
        ("GR10MM0808", Orientation::Deg0) => {
            let order = (0..8).rev().flat_map(|block| asc(block * 8, block * 8 + 7)).collect();
            Some((order, 8, 8))
        }
        ("GR10MM0808", Orientation::Deg180) => {
            let order = (0..8).flat_map(|block| desc(block * 8 + 7, block * 8)).collect();
            Some((order, 8, 8))
        }
        _ => None,
    }
}

/// Arrange the raw EMG into the physical matrix layout
///
/// With a known `code` the channels are reordered for the given orientation
/// and the empty matrix corner becomes a NaN channel. With `code = None` the
/// channels are taken as they are and `n_rows x n_cols` must cover them all.
/// Positions are renumbered from 0 in the sorted order. When `dividebycolumn`
/// is false the whole matrix is returned as a single column.
pub fn sort_rawemg(
    emgfile: &EmgFile,
    code: Option<&str>,
    orientation: u16,
    dividebycolumn: bool,
    n_rows: Option<usize>,
    n_cols: Option<usize>,
) -> EmgResult<SortedChannels> {
    let err = || EmgErrorBuilder::new("electrodes", "sort_rawemg");
    let orientation = Orientation::try_from(orientation)?;
    let raw = &emgfile.raw_signal;
    let n_samples = raw.nrows();

    let (sorted, rows, cols) = match code {
        Some(code) => {
            let (order, rows, cols) = channel_order(code, orientation).ok_or_else(|| {
                err().invalid_data("code", &format!("unsupported electrode code '{}'", code))
            })?;
            let needed = order.iter().flatten().max().map(|m| m + 1).unwrap_or(0);
            if raw.ncols() < needed {
                return Err(err().mismatch("RAW_SIGNAL", "not enough channels for the matrix", needed, raw.ncols()));
            }
            let mut sorted = Array2::from_elem((n_samples, order.len()), f64::NAN);
            for (pos, channel) in order.iter().enumerate() {
                if let Some(ch) = channel {
                    sorted.column_mut(pos).assign(&raw.column(*ch));
                }
            }
            (sorted, rows, cols)
        }
        None => {
            let (rows, cols) = match (n_rows, n_cols) {
                (Some(r), Some(c)) => (r, c),
                _ => return Err(err().invalid_data("n_rows", "n_rows and n_cols are required without an electrode code")),
            };
            if rows * cols != raw.ncols() {
                return Err(err().mismatch("RAW_SIGNAL", "n_rows * n_cols must equal the channel count", rows * cols, raw.ncols()));
            }
            (raw.clone(), rows, cols)
        }
    };
    debug!(rows, cols, dividebycolumn, "sorted raw EMG channels");

    if !dividebycolumn {
        return Ok(ChannelGrid {
            columns: vec![GridColumn {
                channels: (0..sorted.ncols()).collect(),
                data: sorted,
            }],
        });
    }

    let columns = (0..cols)
        .map(|c| {
            let channels: Vec<usize> = (c * rows..(c + 1) * rows).collect();
            GridColumn {
                data: sorted.select(Axis(1), &channels),
                channels,
            }
        })
        .collect();
    Ok(ChannelGrid { columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emgfile::Source;

    /// Channel `c` holds the constant value `c`
    fn labelled_file(channels: usize) -> EmgFile {
        let raw = Array2::from_shape_fn((4, channels), |(_, c)| c as f64);
        EmgFile::new(Source::Otb, "grid", raw, 2048.0, 8.0)
    }

    #[test]
    fn test_ied_table() {
        assert_eq!(ied_of("GR100ML1305"), Some(2.5));
        assert_eq!(ied_of("HD04MM1305"), Some(4.0));
        assert_eq!(ied_of("unknown"), None);
        assert_eq!(electrodes_of("GR10MM0804"), Some(32));
        assert_eq!(electrodes_of("GR08MM1305"), Some(64));
        assert!(OTB_ELECTRODES.iter().all(|c| ied_of(c).is_some()));
    }

    #[test]
    fn test_gr08_orientation_180() {
        let sorted = sort_rawemg(&labelled_file(64), Some("GR08MM1305"), 180, true, None, None).unwrap();
        assert_eq!(sorted.columns.len(), 5);
        assert!(sorted.columns.iter().all(|c| c.channels.len() == 13));

        let first = &sorted.columns[0];
        assert!(first.data[[0, 0]].is_nan());
        assert_eq!(first.data[[0, 1]], 0.0);
        assert_eq!(first.data[[0, 12]], 11.0);
        assert_eq!(sorted.columns[1].data[[0, 0]], 24.0);
        assert_eq!(sorted.columns[4].data[[0, 12]], 63.0);
        assert_eq!(sorted.columns[1].channels[0], 13);
    }

    #[test]
    fn test_gr08_orientation_0() {
        let sorted = sort_rawemg(&labelled_file(64), Some("GR04MM1305"), 0, true, None, None).unwrap();
        assert_eq!(sorted.columns[0].data[[0, 0]], 63.0);
        assert_eq!(sorted.columns[1].data[[0, 0]], 38.0);
        assert!(sorted.columns[4].data[[0, 12]].is_nan());
    }

    #[test]
    fn test_gr10mm0808_blocks() {
        let sorted = sort_rawemg(&labelled_file(64), Some("GR10MM0808"), 0, true, None, None).unwrap();
        assert_eq!(sorted.columns.len(), 8);
        assert_eq!(sorted.columns[0].data[[0, 0]], 56.0);
        assert_eq!(sorted.columns[4].data[[0, 0]], 24.0);
        assert_eq!(sorted.columns[4].data[[0, 7]], 31.0);

        let flipped = sort_rawemg(&labelled_file(64), Some("GR10MM0808"), 180, true, None, None).unwrap();
        assert_eq!(flipped.columns[0].data[[0, 0]], 7.0);
        assert_eq!(flipped.columns[7].data[[0, 7]], 56.0);
    }

    #[test]
    fn test_custom_geometry() {
        let sorted = sort_rawemg(&labelled_file(12), None, 180, true, Some(4), Some(3)).unwrap();
        assert_eq!(sorted.columns.len(), 3);
        assert_eq!(sorted.columns[2].data[[0, 0]], 8.0);

        assert!(sort_rawemg(&labelled_file(12), None, 180, true, Some(5), Some(3)).is_err());
        assert!(sort_rawemg(&labelled_file(12), None, 180, true, None, None).is_err());
    }

    #[test]
    fn test_undivided_and_invalid_inputs() {
        let whole = sort_rawemg(&labelled_file(64), Some("GR08MM1305"), 180, false, None, None).unwrap();
        assert_eq!(whole.columns.len(), 1);
        assert_eq!(whole.n_channels(), 65);

        assert!(sort_rawemg(&labelled_file(64), Some("GR08MM1305"), 90, true, None, None).is_err());
        assert!(sort_rawemg(&labelled_file(32), Some("GR08MM1305"), 0, true, None, None).is_err());
        assert!(sort_rawemg(&labelled_file(64), Some("HD08MM1305"), 0, true, None, None).is_err());
    }
}
