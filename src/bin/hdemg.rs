// src/bin/hdemg.rs
//! `hdemg` - inspect and analyse decomposed HD-EMG recordings

#![deny(unsafe_code)]

use clap::Parser;

use hdemg_core::cli::{run, Cli};
use hdemg_core::init_logging;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity());
    run(cli)
}
