// src/cli/commands.rs
//! Subcommand arguments

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Output format of reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Describe the fields of a saved file
#[derive(Debug, Args)]
pub struct InfoCommand {
    /// File saved in the JSON format
    pub file: PathBuf,

    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Convert legacy JSON files to the current layout
#[derive(Debug, Args)]
pub struct ConvertCommand {
    /// A legacy file or a directory of legacy files
    pub old: PathBuf,

    /// Destination directory
    pub new: PathBuf,

    /// Appended to each converted file name, defaults to the configured value
    #[arg(long)]
    pub append_name: Option<String>,

    /// gzip level 0-9, defaults to the configured value
    #[arg(long)]
    pub compresslevel: Option<u32>,

    /// Replace files that already exist in the destination
    #[arg(long)]
    pub overwrite: bool,
}

/// Write a saved emgfile as custom CSV
#[derive(Debug, Args)]
pub struct ExportCsvCommand {
    /// File saved in the JSON format
    pub input: PathBuf,

    /// CSV file to write
    pub output: PathBuf,
}

/// Read a custom CSV file and save it in the JSON format
#[derive(Debug, Args)]
pub struct ImportCsvCommand {
    /// CSV file to read
    pub input: PathBuf,

    /// JSON file to write
    pub output: PathBuf,

    /// Sampling frequency in Hz, defaults to the configured value
    #[arg(long)]
    pub fsamp: Option<f64>,

    /// Inter electrode distance in mm, defaults to the configured value
    #[arg(long)]
    pub ied: Option<f64>,

    /// Read only the reference signal
    #[arg(long)]
    pub refsig: bool,
}

/// Compute the basic properties of every MU
#[derive(Debug, Args)]
pub struct PropertiesCommand {
    /// File saved in the JSON format
    pub file: PathBuf,

    /// First and last sample of the steady phase
    #[arg(long, num_args = 2, value_names = ["START", "END"], required = true)]
    pub steady: Vec<usize>,

    /// Maximum voluntary contraction, in reference signal units
    #[arg(long)]
    pub mvc: f64,

    /// Accuracy metric: default, SIL, PNR or SIL_PNR
    #[arg(long, default_value = "default")]
    pub accuracy: String,

    /// CSV file to write, stdout when absent
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Track MUs between two recordings of the same muscle
#[derive(Debug, Args)]
pub struct TrackCommand {
    pub file1: PathBuf,
    pub file2: PathBuf,

    /// Minimum cross-correlation of a match, defaults to the configured value
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Electrode code used to sort the channels
    #[arg(long, default_value = "GR08MM1305")]
    pub matrixcode: String,

    /// Grid orientation, 0 or 180
    #[arg(long, default_value = "180")]
    pub orientation: u16,

    /// mono, sd or dd
    #[arg(long, default_value = "sd")]
    pub derivation: String,

    /// Keep pairs below the threshold
    #[arg(long)]
    pub keep_all: bool,

    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Configuration commands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show {
        /// Output as JSON instead of TOML
        #[arg(short, long)]
        json: bool,
    },

    /// Validate a configuration file on its own
    Validate {
        /// Path to the TOML file to validate
        file: PathBuf,
    },

    /// Write the effective configuration as TOML
    Export {
        /// Destination file
        file: PathBuf,
    },
}
