// src/config/constants.rs
//! Crate-wide constants

/// Recording defaults used when a file does not carry its own values
pub mod emgfile {
    pub const DEFAULT_FSAMP: f64 = 2048.0;
    pub const DEFAULT_IED_MM: f64 = 8.0;
}

/// Persisted JSON format
pub mod format {
    pub const LEGACY_VERSION: &str = "0.1.0-beta.2";
    pub const CURRENT_VERSION: &str = "0.1.0-beta.3";
    pub const DEFAULT_COMPRESS_LEVEL: u32 = 4;
    pub const MAX_COMPRESS_LEVEL: u32 = 9;
    pub const DEFAULT_APPEND_NAME: &str = "converted";
    pub const JSON_EXTENSION: &str = "json";
}

/// Column prefixes of the custom CSV layout
pub mod csv_labels {
    pub const REF_SIGNAL: &str = "REF_SIGNAL";
    pub const RAW_SIGNAL: &str = "RAW_SIGNAL";
    pub const IPTS: &str = "IPTS";
    pub const MUPULSES: &str = "MUPULSES";
    pub const BINARY_MUS_FIRING: &str = "BINARY_MUS_FIRING";
    pub const ACCURACY: &str = "ACCURACY";
    pub const EXTRAS: &str = "EXTRAS";
}

/// Butterworth defaults
pub mod filters {
    pub const RAWEMG_ORDER: usize = 2;
    pub const RAWEMG_LOWCUT_HZ: f64 = 20.0;
    pub const RAWEMG_HIGHCUT_HZ: f64 = 500.0;
    pub const REFSIG_ORDER: usize = 4;
    pub const REFSIG_CUTOFF_HZ: f64 = 15.0;
    pub const MAX_ORDER: usize = 12;
}

/// Discharge statistics
pub mod firings {
    pub const N_FIRINGS_REC_DEREC: usize = 4;
    pub const N_FIRINGS_STEADY: usize = 10;
    /// Samples around each discharge excluded from the PNR noise estimate
    pub const PNR_EXCLUSION_SAMPLES: usize = 3;
    pub const DEFAULT_RFD_MS: [f64; 4] = [50.0, 100.0, 150.0, 200.0];
}

/// MUAP extraction, tracking and duplicate removal
pub mod muap {
    pub const STA_TIMEWINDOW_MS: f64 = 50.0;
    pub const TRACKING_THRESHOLD: f64 = 0.8;
    pub const DUPLICATES_THRESHOLD: f64 = 0.9;
    pub const ALIGN_FINAL_DURATION: f64 = 0.5;
    pub const DEFAULT_STA_FIRINGS: (usize, usize) = (0, 50);
}

/// Maximum likelihood conduction velocity
pub mod mle {
    pub const TOLERANCE: f64 = 5e-5;
    pub const MAX_ITERATIONS: usize = 30;
    pub const MAX_STEP: f64 = 0.5;
    pub const MIN_CV_M_S: f64 = 1.0;
    pub const MAX_CV_M_S: f64 = 10.0;
}

/// Support vector regression of discharge rates
pub mod svr {
    pub const GAMMA: f64 = 1.0 / 1.6;
    pub const REGULARIZATION: f64 = 1.0 / 0.370;
    pub const ENDPOINT_WEIGHT_PULSES: usize = 5;
    pub const ENDPOINT_WEIGHT_MAGNITUDE: f64 = 5.0;
    pub const DISCONTINUITY_DURATION_S: f64 = 1.0;
    /// Divisor applied to the IQR of the discharge rate to obtain epsilon
    pub const EPSILON_IQR_DIVISOR: f64 = 11.0;
    pub const SOLVER_TOLERANCE: f64 = 1e-3;
    pub const SOLVER_MAX_PASSES: usize = 10_000;
}

/// Paired motor unit (deltaF) analysis
pub mod deltaf {
    pub const RECRUITMENT_DIFFERENCE_CUTOFF_S: f64 = 1.0;
    pub const CORR_CUTOFF: f64 = 0.7;
    pub const CONTROL_UNIT_MODULATION_CUTOFF_PPS: f64 = 0.5;
}

/// Configuration discovery
pub mod paths {
    pub const DEFAULT_CONFIG_FILE: &str = "hdemg.toml";
    pub const LOCAL_CONFIG_FILE: &str = "hdemg.local.toml";
    pub const USER_CONFIG_DIR: &str = ".config/hdemg";
    pub const ENV_PREFIX: &str = "HDEMG";
    pub const ENV_SEPARATOR: &str = "__";
}
