// src/processing/mod.rs
//! Signal processing primitives: Butterworth filtering and cross-correlation

pub mod correlation;
pub mod filters;

pub use correlation::{correlate2d_full, correlate_full};
pub use filters::{BandType, BiquadSection, FilterError, IirFilter};

/// Digital Butterworth filter as second-order sections
pub fn butterworth_sos(order: usize, band: BandType, fsamp: f64) -> Result<IirFilter, FilterError> {
    IirFilter::butterworth(order, band, fsamp)
}

/// Zero-phase filtering of `x` with the sections of `sos`
pub fn sosfiltfilt(sos: &IirFilter, x: &[f64]) -> Result<Vec<f64>, FilterError> {
    sos.filtfilt(x)
}
