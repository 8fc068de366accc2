// src/muap/differential.rs
//! Single and double differential derivations along matrix columns

use crate::electrodes::{ChannelGrid, GridColumn};
use ndarray::{Array2, Zip};

/// Single differential: each channel minus the next one in its column
///
/// The first channel of every column is dropped; the others keep their
/// position labels.
pub fn diff(sorted: &ChannelGrid) -> ChannelGrid {
    sorted.map_columns(|col| derive(col, 1, |data, pos| {
        let mut out = data.column(pos - 1).to_owned();
        out -= &data.column(pos);
        out
    }))
}

/// Double differential: `-x[pos-2] + 2 x[pos-1] - x[pos]` along each column
pub fn double_diff(sorted: &ChannelGrid) -> ChannelGrid {
    sorted.map_columns(|col| derive(col, 2, |data, pos| {
        let mut out = ndarray::Array1::zeros(data.nrows());
        Zip::from(&mut out)
            .and(data.column(pos - 2))
            .and(data.column(pos - 1))
            .and(data.column(pos))
            .for_each(|o, &a, &b, &c| *o = -a + 2.0 * b - c);
        out
    }))
}

fn derive<F>(col: &GridColumn, skip: usize, f: F) -> GridColumn
where
    F: Fn(&Array2<f64>, usize) -> ndarray::Array1<f64>,
{
    let n = col.channels.len().saturating_sub(skip);
    let mut data = Array2::zeros((col.data.nrows(), n));
    for (out, pos) in (skip..col.channels.len()).enumerate() {
        data.column_mut(out).assign(&f(&col.data, pos));
    }
    GridColumn {
        channels: col.channels[skip.min(col.channels.len())..].to_vec(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::muap::test_support::single_column;
    use ndarray::array;

    #[test]
    fn test_single_differential() {
        let grid = single_column(array![[1.0, 4.0, 9.0], [2.0, 2.0, 2.0]]);
        let sd = diff(&grid);
        assert_eq!(sd.columns[0].channels, vec![1, 2]);
        assert_eq!(sd.columns[0].data, array![[-3.0, -5.0], [0.0, 0.0]]);
    }

    #[test]
    fn test_double_differential() {
        let grid = single_column(array![[1.0, 4.0, 9.0, 16.0]]);
        let dd = double_diff(&grid);
        assert_eq!(dd.columns[0].channels, vec![2, 3]);
        // Second difference of squares is -2
        assert_eq!(dd.columns[0].data, array![[-2.0, -2.0]]);
    }

    #[test]
    fn test_nan_propagates_to_neighbours() {
        let grid = single_column(array![[f64::NAN, 1.0, 2.0, 3.0]]);
        let sd = diff(&grid);
        assert!(sd.columns[0].data[[0, 0]].is_nan());
        assert_eq!(sd.columns[0].valid_channels(), vec![1, 2]);
    }
}
