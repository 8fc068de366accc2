// src/electrodes/grid.rs
//! Channels arranged by matrix column

use crate::error::{EmgErrorBuilder, EmgResult};
use ndarray::{concatenate, s, Array2, Axis};

/// One matrix column: channel positions and their signals (`samples x channels`)
///
/// Positions index the sorted matrix, row-major within the column, so adjacent
/// positions are adjacent electrodes. Empty electrodes hold NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct GridColumn {
    pub channels: Vec<usize>,
    pub data: Array2<f64>,
}

impl GridColumn {
    /// Channels that hold a signal (no NaN sample)
    pub fn valid_channels(&self) -> Vec<usize> {
        (0..self.channels.len())
            .filter(|&c| self.data.column(c).iter().all(|v| !v.is_nan()))
            .collect()
    }
}

/// Signals of a whole electrode matrix, split by column
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelGrid {
    pub columns: Vec<GridColumn>,
}

impl ChannelGrid {
    /// Number of samples per channel
    pub fn n_samples(&self) -> usize {
        self.columns.first().map(|c| c.data.nrows()).unwrap_or(0)
    }

    /// Total number of channels, empty ones included
    pub fn n_channels(&self) -> usize {
        self.columns.iter().map(|c| c.channels.len()).sum()
    }

    /// Flatten all columns into one `samples x channels` table
    pub fn unpack(&self) -> (Vec<usize>, Array2<f64>) {
        let channels = self.columns.iter().flat_map(|c| c.channels.iter().copied()).collect();
        let views: Vec<_> = self.columns.iter().map(|c| c.data.view()).collect();
        let data = if views.is_empty() {
            Array2::zeros((0, 0))
        } else {
            concatenate(Axis(1), &views).unwrap_or_else(|_| Array2::zeros((0, 0)))
        };
        (channels, data)
    }

    /// Flatten, dropping channels that contain NaN
    pub fn unpack_valid(&self) -> Array2<f64> {
        let (_, data) = self.unpack();
        let keep: Vec<usize> = (0..data.ncols())
            .filter(|&c| data.column(c).iter().all(|v| !v.is_nan()))
            .collect();
        data.select(Axis(1), &keep)
    }

    /// Split a flat table back using the column layout of `self`
    pub fn pack_like(&self, data: Array2<f64>) -> EmgResult<ChannelGrid> {
        if data.ncols() != self.n_channels() {
            return Err(EmgErrorBuilder::new("electrodes::grid", "pack").mismatch(
                "channels",
                "table does not match the grid layout",
                self.n_channels(),
                data.ncols(),
            ));
        }
        let mut start = 0;
        let columns = self
            .columns
            .iter()
            .map(|col| {
                let end = start + col.channels.len();
                let column = GridColumn {
                    channels: col.channels.clone(),
                    data: data.slice(s![.., start..end]).to_owned(),
                };
                start = end;
                column
            })
            .collect();
        Ok(ChannelGrid { columns })
    }

    /// Apply a function to every column signal
    pub fn map_columns<F>(&self, f: F) -> ChannelGrid
    where
        F: Fn(&GridColumn) -> GridColumn,
    {
        ChannelGrid {
            columns: self.columns.iter().map(f).collect(),
        }
    }
}
