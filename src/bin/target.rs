//! Singer NDJSON Target CLI
//!
//! Reads tap output on stdin, writes one NDJSON file per stream and prints
//! the final state to stdout.

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use target_ndjson::{emit_state, spawn_usage_report, Target, TargetConfig};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset so the collection notice is shown
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser)]
#[command(name = "target-ndjson")]
#[command(about = "Write Singer tap output to NDJSON files", version)]
struct Cli {
    /// Config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = TargetConfig::load_from(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config".to_string(),
    })?;

    if !config.disable_collection {
        info!(
            "Sending version information to singer.io. To disable sending anonymous usage data, \
             set the config parameter \"disable_collection\" to true"
        );
        spawn_usage_report(env!("CARGO_PKG_VERSION"));
    }

    let target = Target::new(&config);
    let state = target.persist_reader(io::stdin().lock())?;

    emit_state(state.as_ref(), io::stdout().lock())?;
    debug!("Exiting normally");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_filter_enables_info() {
        let filter: EnvFilter = DEFAULT_LOG_FILTER.parse().unwrap();
        assert_eq!(filter.to_string(), "info");
    }
}
