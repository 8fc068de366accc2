// src/cli/mod.rs
//! Command-line interface of the `hdemg` binary

mod commands;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, ConvertCommand, ExportCsvCommand, ImportCsvCommand, InfoCommand, OutputFormat, PropertiesCommand,
    TrackCommand,
};

use crate::analysis::{basic_mus_properties, AccuracyMetric, PropertiesParams, SteadyRange};
use crate::compat::{convert_json_output, ConvertOptions};
use crate::config::{AnalysisConfig, ConfigLoader};
use crate::io::{emg_from_customcsv, emg_from_json, refsig_from_customcsv, save_customcsv, save_json_emgfile, CsvLabels};
use crate::logging::Verbosity;
use crate::muap::{tracking, Derivation, TrackingParams};

/// hdemg - inspect and analyse decomposed HD-EMG recordings
#[derive(Debug, Parser)]
#[command(name = "hdemg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file merged over the defaults
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Info(InfoCommand),
    Convert(ConvertCommand),
    ExportCsv(ExportCsvCommand),
    ImportCsv(ImportCsvCommand),
    Properties(PropertiesCommand),
    Track(TrackCommand),
    /// View, validate or export the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }

    /// Effective configuration: defaults, discovered files, `--config`, environment
    pub fn load_config(&self) -> Result<AnalysisConfig> {
        let mut loader = ConfigLoader::new();
        if let Some(path) = &self.config {
            loader = loader.with_file(path)?;
        }
        Ok(loader.load()?)
    }
}

/// Run a parsed command line
pub fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match &cli.command {
        Command::Info(cmd) => info(cmd, &mut out),
        Command::Convert(cmd) => convert(cmd, &config, &mut out),
        Command::ExportCsv(cmd) => export_csv(cmd),
        Command::ImportCsv(cmd) => import_csv(cmd, &config),
        Command::Properties(cmd) => properties(cmd, &config, &mut out),
        Command::Track(cmd) => track(cmd, &config, &mut out),
        Command::Config(cmd) => config_command(cmd, &config, &mut out),
    }
}

fn info<W: Write>(cmd: &InfoCommand, out: &mut W) -> Result<()> {
    let data = emg_from_json(&cmd.file).with_context(|| format!("loading {}", cmd.file.display()))?;
    let summary = crate::info::data(&data);
    match cmd.format {
        OutputFormat::Text => write!(out, "{}", summary)?,
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?,
    }
    Ok(())
}

fn convert<W: Write>(cmd: &ConvertCommand, config: &AnalysisConfig, out: &mut W) -> Result<()> {
    let mut options = ConvertOptions::from_config(&config.io);
    if let Some(name) = &cmd.append_name {
        options.append_name = name.clone();
    }
    if let Some(level) = cmd.compresslevel {
        options.compresslevel = level;
    }
    options.overwrite = cmd.overwrite;

    for path in convert_json_output(&cmd.old, &cmd.new, &options)? {
        writeln!(out, "{}", path.display())?;
    }
    Ok(())
}

fn export_csv(cmd: &ExportCsvCommand) -> Result<()> {
    let emgfile = emg_from_json(&cmd.input)?.into_emg()?;
    save_customcsv(&emgfile, &cmd.output)?;
    Ok(())
}

fn import_csv(cmd: &ImportCsvCommand, config: &AnalysisConfig) -> Result<()> {
    let labels = CsvLabels::default();
    let fsamp = cmd.fsamp.unwrap_or(config.emgfile.fsamp);
    let data = if cmd.refsig {
        refsig_from_customcsv(&cmd.input, &labels, fsamp)?.into()
    } else {
        let ied = cmd.ied.unwrap_or(config.emgfile.ied);
        emg_from_customcsv(&cmd.input, &labels, fsamp, ied)?.into()
    };
    save_json_emgfile(&data, &cmd.output, config.io.compress_level)?;
    Ok(())
}

fn properties<W: Write>(cmd: &PropertiesCommand, config: &AnalysisConfig, out: &mut W) -> Result<()> {
    let emgfile = emg_from_json(&cmd.file)?.into_emg()?;
    let accuracy: AccuracyMetric = cmd.accuracy.parse()?;
    let steady = SteadyRange::new(cmd.steady[0], cmd.steady[1]);
    let params = PropertiesParams::from_config(&config.firings, steady, cmd.mvc).with_accuracy(accuracy);
    let props = basic_mus_properties(&emgfile, &params)?;

    match &cmd.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            props.write_csv(BufWriter::new(file))?;
        }
        None => props.write_csv(out)?,
    }
    Ok(())
}

fn track<W: Write>(cmd: &TrackCommand, config: &AnalysisConfig, out: &mut W) -> Result<()> {
    let emgfile1 = emg_from_json(&cmd.file1)?.into_emg()?;
    let emgfile2 = emg_from_json(&cmd.file2)?.into_emg()?;
    let derivation: Derivation = cmd.derivation.parse()?;

    let mut params = TrackingParams::from_config(&config.muap);
    params.derivation = derivation;
    params.matrixcode = Some(cmd.matrixcode.clone());
    params.orientation = cmd.orientation;
    params.exclude_belowthreshold = !cmd.keep_all;
    if let Some(threshold) = cmd.threshold {
        params.threshold = threshold;
    }

    let matches = tracking(&emgfile1, &emgfile2, &params)?;
    match cmd.format {
        OutputFormat::Text => {
            writeln!(out, "{:>10} {:>10} {:>8}", "MU_file1", "MU_file2", "XCC")?;
            for m in &matches {
                writeln!(out, "{:>10} {:>10} {:>8.4}", m.mu_file1, m.mu_file2, m.xcc)?;
            }
        }
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&matches)?)?,
    }
    Ok(())
}

fn config_command<W: Write>(cmd: &ConfigCommand, config: &AnalysisConfig, out: &mut W) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json: true } => writeln!(out, "{}", serde_json::to_string_pretty(config)?)?,
        ConfigCommand::Show { json: false } => write!(out, "{}", toml::to_string_pretty(config)?)?,
        ConfigCommand::Validate { file } => {
            ConfigLoader::new().validate_config_file(file)?;
            writeln!(out, "{}: configuration is valid", file.display())?;
        }
        ConfigCommand::Export { file } => {
            ConfigLoader::export_config(config, file)?;
            writeln!(out, "{}", file.display())?;
        }
    }
    Ok(())
}
