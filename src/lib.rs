//! HDEMG-Core: analysis of decomposed high-density EMG recordings
//!
//! The crate works on the *emgfile*, a recording together with the outcome
//! of its decomposition into motor units (MUs):
//!
//! - Loading and saving files in the gzip JSON format and the custom CSV layout
//! - Conversion of files written by the previous format version
//! - Editing tools: resizing, MU removal and sorting, filtering, offset removal
//! - MU properties: recruitment thresholds, discharge rates, variability
//! - MUAPs by spike-triggered averaging, tracking across recordings,
//!   duplicate removal and conduction velocity
//! - Persistent inward currents via the deltaF method
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hdemg_core::analysis::{basic_mus_properties, PropertiesParams, SteadyRange};
//! use hdemg_core::io::emg_from_json;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let emgfile = emg_from_json("trapezoid.json")?.into_emg()?;
//!     let params = PropertiesParams::new(SteadyRange::new(4000, 12000), 300.0);
//!     let props = basic_mus_properties(&emgfile, &params)?;
//!     props.write_csv(std::io::stdout())?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod analysis;
pub mod compat;
pub mod config;
pub mod electrodes;
pub mod emgfile;
pub mod error;
pub mod info;
pub mod io;
pub mod mathtools;
pub mod muap;
pub mod pic;
pub mod processing;
pub mod tools;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod logging;

pub use config::{AnalysisConfig, ConfigLoader};
pub use emgfile::{EmgData, EmgFile, Extras, HasRefSignal, RefSigFile, Source};
pub use error::{EmgError, EmgErrorBuilder, EmgResult};
pub use io::{emg_from_customcsv, emg_from_json, save_customcsv, save_json_emgfile};

#[cfg(feature = "cli")]
pub use logging::{init_logging, Verbosity};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Version of the JSON format written by [`io::save_json_emgfile`]
pub const FORMAT_VERSION: &str = config::constants::format::CURRENT_VERSION;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(NAME, "hdemg-core");
        assert!(!VERSION.is_empty());
        assert_eq!(FORMAT_VERSION, "0.1.0-beta.3");
    }
}
