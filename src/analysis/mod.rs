// src/analysis/mod.rs
//! Motor unit properties
//!
//! Recruitment thresholds, discharge rates and discharge variability of every
//! MU in an emgfile. The steady-state phase and the MVC are explicit inputs;
//! a measure that cannot be computed for lack of discharges is NaN.

pub mod discharge;
pub mod properties;
pub mod thresholds;

pub use discharge::{compute_covisi, compute_dr, compute_drvariability, compute_mu_covisi, CovIsi, DischargeRate, DrVariability};
pub use properties::{basic_mus_properties, AccuracyMetric, MuProperties, MusProperties, PropertiesParams};
pub use thresholds::{compute_thresholds, ThresholdEvent, ThresholdType, Thresholds};

use crate::config::FiringsConfig;
use crate::error::{EmgErrorBuilder, EmgResult};
use serde::{Deserialize, Serialize};

/// Phases of a contraction a discharge measure is reported for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DischargeEvent {
    Rec,
    Derec,
    RecDerec,
    Steady,
    #[default]
    RecDerecSteady,
}

impl DischargeEvent {
    pub fn has_rec(&self) -> bool {
        matches!(self, Self::Rec | Self::RecDerec | Self::RecDerecSteady)
    }

    pub fn has_derec(&self) -> bool {
        matches!(self, Self::Derec | Self::RecDerec | Self::RecDerecSteady)
    }

    pub fn has_steady(&self) -> bool {
        matches!(self, Self::Steady | Self::RecDerecSteady)
    }
}

impl std::str::FromStr for DischargeEvent {
    type Err = crate::error::EmgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rec" => Ok(Self::Rec),
            "derec" => Ok(Self::Derec),
            "rec_derec" => Ok(Self::RecDerec),
            "steady" => Ok(Self::Steady),
            "rec_derec_steady" => Ok(Self::RecDerecSteady),
            other => Err(EmgErrorBuilder::new("analysis", "parse_event").configuration(&format!(
                "event must be one of rec, derec, rec_derec, steady, rec_derec_steady, got '{}'",
                other
            ))),
        }
    }
}

/// Sample range of the steady-state phase, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteadyRange {
    pub start: usize,
    pub end: usize,
}

impl SteadyRange {
    /// Build a range from two points given in any order
    pub fn new(a: usize, b: usize) -> Self {
        Self { start: a.min(b), end: a.max(b) }
    }

    pub fn contains(&self, sample: usize) -> bool {
        (self.start..=self.end).contains(&sample)
    }
}

/// Parameters shared by the discharge measures
#[derive(Debug, Clone, PartialEq)]
pub struct DischargeParams {
    /// Discharges used at recruitment; derecruitment uses one less
    pub n_firings_rec_derec: usize,
    /// Discharges used at the start and the end of the steady state
    pub n_firings_steady: usize,
    pub steady: Option<SteadyRange>,
    pub event: DischargeEvent,
}

impl Default for DischargeParams {
    fn default() -> Self {
        Self::from_config(&FiringsConfig::default())
    }
}

impl DischargeParams {
    pub fn from_config(config: &FiringsConfig) -> Self {
        Self {
            n_firings_rec_derec: config.n_firings_rec_derec,
            n_firings_steady: config.n_firings_steady,
            steady: None,
            event: DischargeEvent::default(),
        }
    }

    pub fn with_steady(mut self, start: usize, end: usize) -> Self {
        self.steady = Some(SteadyRange::new(start, end));
        self
    }

    pub fn with_event(mut self, event: DischargeEvent) -> Self {
        self.event = event;
        self
    }

    /// Steady range required by the selected event
    pub(crate) fn steady_range(&self, operation: &str) -> EmgResult<Option<SteadyRange>> {
        if !self.event.has_steady() {
            return Ok(None);
        }
        match self.steady {
            Some(range) => Ok(Some(range)),
            None => Err(EmgErrorBuilder::new("analysis", operation)
                .configuration("the steady-state start and end must be given for steady events")),
        }
    }
}

/// Mean of the finite values, NaN when there are none
pub(crate) fn nanmean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Sample standard deviation of the finite values, NaN below two values
pub(crate) fn nanstd(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.len() < 2 {
        return f64::NAN;
    }
    let m = finite.iter().sum::<f64>() / finite.len() as f64;
    (finite.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (finite.len() - 1) as f64).sqrt()
}

/// Coefficient of variation in percent
pub(crate) fn cov_percent(values: &[f64]) -> f64 {
    nanstd(values) / nanmean(values) * 100.0
}

/// Last `n` values of a slice
pub(crate) fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_statistics() {
        let v = [f64::NAN, 2.0, 4.0, 6.0];
        assert_eq!(nanmean(&v), 4.0);
        assert_eq!(nanstd(&v), 2.0);
        assert_eq!(cov_percent(&v), 50.0);
        assert!(nanmean(&[f64::NAN]).is_nan());
        assert!(nanstd(&[1.0]).is_nan());
    }

    #[test]
    fn test_steady_events_require_a_range() {
        let params = DischargeParams::default();
        assert!(params.steady_range("test").is_err());
        assert!(params.clone().with_event(DischargeEvent::RecDerec).steady_range("test").unwrap().is_none());
        let range = params.with_steady(900, 100).steady_range("test").unwrap().unwrap();
        assert_eq!((range.start, range.end), (100, 900));
    }

    #[test]
    fn test_event_parsing() {
        assert_eq!("rec_derec".parse::<DischargeEvent>().unwrap(), DischargeEvent::RecDerec);
        assert!("plateau".parse::<DischargeEvent>().is_err());
    }
}
