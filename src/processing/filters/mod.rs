// src/processing/filters/mod.rs
//! Digital filters for EMG and reference signals

pub mod iir;

pub use iir::*;

use crate::error::{EmgError, ErrorContext, ProcessingStage};
use serde::{Deserialize, Serialize};

/// Frequency band of a filter, cutoffs in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BandType {
    Lowpass(f64),
    Highpass(f64),
    Bandpass(f64, f64),
}

/// One second-order section in direct form II transposed
///
/// `y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadSection {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadSection {
    /// True for sections that only carry a first-order term
    pub fn is_first_order(&self) -> bool {
        self.b2 == 0.0 && self.a2 == 0.0
    }

    /// Initial state for a unit step input
    pub(crate) fn step_state(&self) -> [f64; 2] {
        let b_first = self.b1 - self.a1 * self.b0;
        let b_second = self.b2 - self.a2 * self.b0;
        let z0 = (b_first + b_second) / (1.0 + self.a1 + self.a2);
        [z0, b_second - self.a2 * z0]
    }

    /// DC gain of the section
    pub(crate) fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// Common filter error types
#[derive(Debug)]
pub enum FilterError {
    InvalidParameters(String),
    SignalTooShort { length: usize, padlen: usize },
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
            FilterError::SignalTooShort { length, padlen } => write!(
                f,
                "Signal of {} samples is too short for zero-phase filtering (needs more than {})",
                length, padlen
            ),
        }
    }
}

impl std::error::Error for FilterError {}

impl From<FilterError> for EmgError {
    fn from(err: FilterError) -> Self {
        EmgError::Processing {
            stage: ProcessingStage::Filtering,
            reason: err.to_string(),
            context: ErrorContext::new("processing::filters", "filtfilt"),
        }
    }
}
