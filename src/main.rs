//! Sample-size estimation for experiment targets.
//!
//! `refresh-manifest` expands the target lists into numbered jobs, `run`
//! sizes a config file or manifest jobs, and `aggregate` merges one day's
//! per-job results into a single report.

mod backend;
mod calculation;
mod catalog;
mod cli;
mod commands;
mod error;
mod executor;
mod expand;
mod export;
mod manifest;
mod model;
mod storage;
mod strategy;
mod targets;
mod util;
mod workflow;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        let causes = err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>();
        error!(error = %err, causes = %causes.join(": "), "auto-sizing failed");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::RefreshManifest(args) => commands::refresh::run(args),
        Commands::Aggregate(args) => commands::aggregate::run(args),
        Commands::Status(args) => commands::status::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
