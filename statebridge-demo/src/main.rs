//! statebridge demo
//!
//! Wires two in-memory containers ("legacy" and "modern") through one bus,
//! drives a short workload and prints the diagnostics report as JSON.
//!
//! Usage:
//!   statebridge-demo --sessions 5 --verbose
//!   statebridge-demo --config bridge.json

use anyhow::{Context, Result};
use clap::Parser;
use statebridge_demo::{Demo, Workload};
use statebridge_diagnostics::{init_logging, LogConfig};
use statebridge_sync::BridgeConfig;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "statebridge-demo")]
#[command(about = "Bridge two in-memory containers and print diagnostics")]
struct Args {
    /// JSON bridge configuration; missing keys keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source tag of the legacy side (overrides the config file)
    #[arg(long)]
    source: Option<String>,

    /// Source tag of the modern side
    #[arg(long, default_value = "modern")]
    peer: String,

    /// Sessions to create
    #[arg(long, default_value = "3")]
    sessions: usize,

    /// Messages per session, alternating sides
    #[arg(long, default_value = "2")]
    messages: usize,

    /// Print compact instead of pretty JSON
    #[arg(long)]
    compact: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if let Some(source) = args.source {
        config.source = source;
    }
    if args.verbose {
        config.log = LogConfig::verbose();
    }
    init_logging(&config.log).context("failed to initialize logging")?;

    info!(legacy = %config.source, modern = %args.peer, "statebridge demo starting");
    let demo = Demo::new(&config, &args.peer)?;
    demo.run(Workload {
        sessions: args.sessions,
        messages_per_session: args.messages,
    })
    .await?;

    let summary = demo.summary();
    if !summary.converged.all() {
        warn!(converged = ?summary.converged, "containers did not converge");
    }
    let json = if args.compact {
        serde_json::to_string(&summary)?
    } else {
        serde_json::to_string_pretty(&summary)?
    };
    println!("{json}");
    demo.dispose();
    Ok(())
}
