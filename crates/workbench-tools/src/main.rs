//! # workbench-sim
//!
//! Runs a RON workbench scenario through an authoritative session and prints
//! every step, with the snapshot its replica received, as one JSON line.
//!
//! ```text
//! workbench-sim <scenario.ron> [--config <assist.toml>] [--pretty]
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workbench_assist::AssistConfig;
use workbench_tools::{Runner, Scenario};

struct Args {
    scenario: PathBuf,
    config: Option<PathBuf>,
    pretty: bool,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut scenario = None;
        let mut config = None;
        let mut pretty = false;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => match args.next() {
                    Some(path) => config = Some(PathBuf::from(path)),
                    None => bail!("--config needs a path"),
                },
                "--pretty" => pretty = true,
                other if other.starts_with("--") => bail!("Unknown option {other}"),
                other => scenario = Some(PathBuf::from(other)),
            }
        }

        let Some(scenario) = scenario else {
            bail!("usage: workbench-sim <scenario.ron> [--config <assist.toml>] [--pretty]");
        };
        Ok(Self {
            scenario,
            config,
            pretty,
        })
    }
}

/// Main entry point.
fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("workbench=info".parse()?))
        .init();

    let args = Args::parse()?;
    info!("workbench-sim {}", env!("CARGO_PKG_VERSION"));

    let config = args
        .config
        .as_ref()
        .map_or_else(AssistConfig::default, AssistConfig::load_from);

    let source = fs::read_to_string(&args.scenario)
        .with_context(|| format!("Failed to read {}", args.scenario.display()))?;
    let scenario = Scenario::from_ron(&source)?;

    let mut runner = Runner::new(&scenario, config);
    for (index, step) in scenario.steps.iter().enumerate() {
        let report = runner.step(index + 1, step)?;
        let line = if args.pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        println!("{line}");
    }

    info!(
        "Finished {} steps at revision {}",
        scenario.steps.len(),
        runner.session().revision()
    );
    Ok(())
}
