//! Batch subsetting of bundled CJK web fonts.

use std::{io, process::ExitCode};

use anyhow::Context as _;
use clap::Parser as _;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::{
    batch::Summary,
    cli::{Cli, Command},
    config::{Config, SubsetPlan},
};

mod batch;
mod cli;
mod config;
mod convert;
mod report;
#[cfg(test)]
mod tests;

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let Some(path) = &cli.config else {
        return Ok(Config::default());
    };
    let config = Config::load(path)?;
    let base_dir = path.parent().unwrap_or(path);
    Ok(config.resolve_paths(base_dir))
}

fn run(cli: Cli, out: &mut dyn io::Write) -> anyhow::Result<Summary> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Subset(args) => {
            let plan = SubsetPlan::new(args, config)?;
            tracing::debug!(?plan.fonts_dir, chars = plan.chars.len(), "resolved subset plan");
            plan.run(out)
        }
        Command::Convert(args) => convert::convert_dir(&args.fonts_dir, out),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli, &mut io::stdout().lock()).context("font processing failed") {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
