#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Headless command-line adapter that runs scripted command-mode sessions.

mod scenario;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use squad_command_core::CommandConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::scenario::ScenarioKind;

/// Runs scripted squad command sessions and prints the resulting state.
#[derive(Debug, Parser)]
#[command(name = "squad-command", version, about, long_about = None)]
struct Args {
    /// Scenario to run.
    #[arg(long, value_enum, default_value_t = ScenarioKind::All)]
    scenario: ScenarioKind,

    /// Number of ticks simulated after the scripted input.
    #[arg(long, default_value_t = 120)]
    ticks: u32,

    /// Simulated milliseconds per tick.
    #[arg(long = "tick-ms", default_value_t = 50)]
    tick_ms: u64,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter directive; overrides RUST_LOG.
    #[arg(long)]
    log: Option<String>,
}

/// Entry point for the squad command command-line interface.
fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log.as_deref())?;

    let config = load_config(args.config.as_deref())?;
    let dt = Duration::from_millis(args.tick_ms.max(1));

    for kind in args.scenario.expand() {
        let report = scenario::run(kind, &config, args.ticks, dt)
            .with_context(|| format!("scenario `{kind}` failed"))?;
        println!("{report}");
    }

    Ok(())
}

fn init_tracing(directive: Option<&str>) -> Result<()> {
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter `{directive}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<CommandConfig> {
    let Some(path) = path else {
        return Ok(CommandConfig::default());
    };
    let config = CommandConfig::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    info!(path = %path.display(), "configuration loaded");
    Ok(config)
}
