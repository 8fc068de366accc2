// src/config/mod.rs
//! Analysis configuration
//!
//! Every default parameter of the analyses lives here so that a TOML file or
//! `HDEMG_*` environment variables can change them in one place. Operations in
//! the library take explicit parameter structs which can be built from an
//! [`AnalysisConfig`].

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};

use serde::{Deserialize, Serialize};

/// Complete analysis configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub emgfile: EmgFileDefaults,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub firings: FiringsConfig,
    #[serde(default)]
    pub muap: MuapConfig,
    #[serde(default)]
    pub svr: SvrConfig,
    #[serde(default)]
    pub deltaf: DeltaFConfig,
    #[serde(default)]
    pub io: IoConfig,
}

/// Defaults applied when importing files that lack this information
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmgFileDefaults {
    #[serde(default = "defaults::fsamp")]
    pub fsamp: f64,

    /// Inter-electrode distance in mm
    #[serde(default = "defaults::ied")]
    pub ied: f64,
}

/// Butterworth filter settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FilterConfig {
    #[serde(default = "defaults::rawemg_order")]
    pub rawemg_order: usize,

    #[serde(default = "defaults::rawemg_lowcut")]
    pub rawemg_lowcut: f64,

    #[serde(default = "defaults::rawemg_highcut")]
    pub rawemg_highcut: f64,

    #[serde(default = "defaults::refsig_order")]
    pub refsig_order: usize,

    #[serde(default = "defaults::refsig_cutoff")]
    pub refsig_cutoff: f64,
}

/// Number of discharges used by the discharge statistics
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FiringsConfig {
    #[serde(default = "defaults::n_firings_rec_derec")]
    pub n_firings_rec_derec: usize,

    #[serde(default = "defaults::n_firings_steady")]
    pub n_firings_steady: usize,
}

/// MUAP, tracking and duplicate removal settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MuapConfig {
    /// STA window in ms
    #[serde(default = "defaults::sta_timewindow")]
    pub sta_timewindow: f64,

    #[serde(default = "defaults::tracking_threshold")]
    pub tracking_threshold: f64,

    #[serde(default = "defaults::duplicates_threshold")]
    pub duplicates_threshold: f64,

    /// Fraction of the STA window kept after alignment
    #[serde(default = "defaults::align_final_duration")]
    pub align_final_duration: f64,
}

/// Support vector regression settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SvrConfig {
    #[serde(default = "defaults::svr_gamma")]
    pub gamma: f64,

    #[serde(default = "defaults::svr_regularization")]
    pub regularization: f64,

    #[serde(default = "defaults::svr_endpoint_pulses")]
    pub endpoint_weight_pulses: usize,

    #[serde(default = "defaults::svr_endpoint_magnitude")]
    pub endpoint_weight_magnitude: f64,

    /// Firing gaps longer than this (s) split the fit
    #[serde(default = "defaults::svr_discontinuity")]
    pub discontinuity_duration: f64,
}

/// Paired motor unit analysis settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeltaFConfig {
    #[serde(default = "defaults::recruitment_difference_cutoff")]
    pub recruitment_difference_cutoff: f64,

    #[serde(default = "defaults::corr_cutoff")]
    pub corr_cutoff: f64,

    #[serde(default = "defaults::controlunitmodulation_cutoff")]
    pub controlunitmodulation_cutoff: f64,

    #[serde(default = "defaults::enabled")]
    pub clean: bool,
}

/// Persisted file settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IoConfig {
    /// gzip level, 0 to 9
    #[serde(default = "defaults::compress_level")]
    pub compress_level: u32,

    #[serde(default = "defaults::append_name")]
    pub append_name: String,
}

/// Default value providers using constants
mod defaults {
    use crate::config::constants::*;

    pub fn fsamp() -> f64 { emgfile::DEFAULT_FSAMP }
    pub fn ied() -> f64 { emgfile::DEFAULT_IED_MM }

    pub fn rawemg_order() -> usize { filters::RAWEMG_ORDER }
    pub fn rawemg_lowcut() -> f64 { filters::RAWEMG_LOWCUT_HZ }
    pub fn rawemg_highcut() -> f64 { filters::RAWEMG_HIGHCUT_HZ }
    pub fn refsig_order() -> usize { filters::REFSIG_ORDER }
    pub fn refsig_cutoff() -> f64 { filters::REFSIG_CUTOFF_HZ }

    pub fn n_firings_rec_derec() -> usize { firings::N_FIRINGS_REC_DEREC }
    pub fn n_firings_steady() -> usize { firings::N_FIRINGS_STEADY }

    pub fn sta_timewindow() -> f64 { muap::STA_TIMEWINDOW_MS }
    pub fn tracking_threshold() -> f64 { muap::TRACKING_THRESHOLD }
    pub fn duplicates_threshold() -> f64 { muap::DUPLICATES_THRESHOLD }
    pub fn align_final_duration() -> f64 { muap::ALIGN_FINAL_DURATION }

    pub fn svr_gamma() -> f64 { svr::GAMMA }
    pub fn svr_regularization() -> f64 { svr::REGULARIZATION }
    pub fn svr_endpoint_pulses() -> usize { svr::ENDPOINT_WEIGHT_PULSES }
    pub fn svr_endpoint_magnitude() -> f64 { svr::ENDPOINT_WEIGHT_MAGNITUDE }
    pub fn svr_discontinuity() -> f64 { svr::DISCONTINUITY_DURATION_S }

    pub fn recruitment_difference_cutoff() -> f64 { deltaf::RECRUITMENT_DIFFERENCE_CUTOFF_S }
    pub fn corr_cutoff() -> f64 { deltaf::CORR_CUTOFF }
    pub fn controlunitmodulation_cutoff() -> f64 { deltaf::CONTROL_UNIT_MODULATION_CUTOFF_PPS }
    pub fn enabled() -> bool { true }

    pub fn compress_level() -> u32 { format::DEFAULT_COMPRESS_LEVEL }
    pub fn append_name() -> String { format::DEFAULT_APPEND_NAME.to_string() }
}

impl Default for EmgFileDefaults {
    fn default() -> Self {
        Self {
            fsamp: defaults::fsamp(),
            ied: defaults::ied(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            rawemg_order: defaults::rawemg_order(),
            rawemg_lowcut: defaults::rawemg_lowcut(),
            rawemg_highcut: defaults::rawemg_highcut(),
            refsig_order: defaults::refsig_order(),
            refsig_cutoff: defaults::refsig_cutoff(),
        }
    }
}

impl Default for FiringsConfig {
    fn default() -> Self {
        Self {
            n_firings_rec_derec: defaults::n_firings_rec_derec(),
            n_firings_steady: defaults::n_firings_steady(),
        }
    }
}

impl Default for MuapConfig {
    fn default() -> Self {
        Self {
            sta_timewindow: defaults::sta_timewindow(),
            tracking_threshold: defaults::tracking_threshold(),
            duplicates_threshold: defaults::duplicates_threshold(),
            align_final_duration: defaults::align_final_duration(),
        }
    }
}

impl Default for SvrConfig {
    fn default() -> Self {
        Self {
            gamma: defaults::svr_gamma(),
            regularization: defaults::svr_regularization(),
            endpoint_weight_pulses: defaults::svr_endpoint_pulses(),
            endpoint_weight_magnitude: defaults::svr_endpoint_magnitude(),
            discontinuity_duration: defaults::svr_discontinuity(),
        }
    }
}

impl Default for DeltaFConfig {
    fn default() -> Self {
        Self {
            recruitment_difference_cutoff: defaults::recruitment_difference_cutoff(),
            corr_cutoff: defaults::corr_cutoff(),
            controlunitmodulation_cutoff: defaults::controlunitmodulation_cutoff(),
            clean: defaults::enabled(),
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            compress_level: defaults::compress_level(),
            append_name: defaults::append_name(),
        }
    }
}

impl AnalysisConfig {
    /// Validate configuration consistency
    pub fn validate_consistency(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.emgfile.fsamp <= 0.0 {
            errors.push(format!("fsamp must be positive, got {}", self.emgfile.fsamp));
        }
        if self.emgfile.ied <= 0.0 {
            errors.push(format!("ied must be positive, got {}", self.emgfile.ied));
        }

        // Filter frequencies vs sampling rate
        let nyquist = self.emgfile.fsamp / 2.0;
        if self.filters.rawemg_lowcut <= 0.0 || self.filters.rawemg_lowcut >= self.filters.rawemg_highcut {
            errors.push(format!(
                "Raw EMG band ({} - {} Hz) must be increasing and positive",
                self.filters.rawemg_lowcut, self.filters.rawemg_highcut
            ));
        }
        if self.filters.rawemg_highcut >= nyquist {
            errors.push(format!(
                "Raw EMG highcut ({} Hz) must be less than Nyquist frequency ({} Hz)",
                self.filters.rawemg_highcut, nyquist
            ));
        }
        if self.filters.refsig_cutoff <= 0.0 || self.filters.refsig_cutoff >= nyquist {
            errors.push(format!(
                "Reference signal cutoff ({} Hz) must be in (0, {}) Hz",
                self.filters.refsig_cutoff, nyquist
            ));
        }
        for (name, order) in [
            ("rawemg_order", self.filters.rawemg_order),
            ("refsig_order", self.filters.refsig_order),
        ] {
            if order == 0 || order > filters::MAX_ORDER {
                errors.push(format!("{} must be 1-{}, got {}", name, filters::MAX_ORDER, order));
            }
        }

        // Recruitment uses n values, derecruitment n - 1
        if self.firings.n_firings_rec_derec < 2 {
            errors.push("n_firings_rec_derec must be at least 2".to_string());
        }
        if self.firings.n_firings_steady == 0 {
            errors.push("n_firings_steady must be at least 1".to_string());
        }

        for (name, value) in [
            ("tracking_threshold", self.muap.tracking_threshold),
            ("duplicates_threshold", self.muap.duplicates_threshold),
            ("align_final_duration", self.muap.align_final_duration),
            ("corr_cutoff", self.deltaf.corr_cutoff),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.muap.sta_timewindow <= 0.0 {
            errors.push("sta_timewindow must be positive".to_string());
        }

        if self.svr.gamma <= 0.0 || self.svr.regularization <= 0.0 {
            errors.push("SVR gamma and regularization must be positive".to_string());
        }

        if self.io.compress_level > format::MAX_COMPRESS_LEVEL {
            errors.push(format!(
                "compress_level must be 0-{}, got {}",
                format::MAX_COMPRESS_LEVEL,
                self.io.compress_level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = AnalysisConfig::default();
        assert_eq!(config.emgfile.fsamp, emgfile::DEFAULT_FSAMP);
        assert_eq!(config.firings.n_firings_rec_derec, firings::N_FIRINGS_REC_DEREC);
        assert_eq!(config.io.compress_level, 4);
        assert!(config.validate_consistency().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AnalysisConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AnalysisConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AnalysisConfig = toml::from_str("[filters]\nrefsig_cutoff = 10.0\n").unwrap();
        assert_eq!(config.filters.refsig_cutoff, 10.0);
        assert_eq!(config.filters.refsig_order, filters::REFSIG_ORDER);
        assert_eq!(config.muap.tracking_threshold, muap::TRACKING_THRESHOLD);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AnalysisConfig::default();
        config.emgfile.fsamp = 512.0;
        config.io.compress_level = 12;

        let errors = config.validate_consistency().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("Nyquist")));
        assert!(errors.iter().any(|e| e.contains("compress_level")));
    }
}
