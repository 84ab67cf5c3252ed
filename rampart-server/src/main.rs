//! # Rampart Server
//!
//! ```bash
//! # Run with a configuration file
//! rampart-server --config config/rampart.yaml
//!
//! # Check a configuration and print it with overrides applied
//! rampart-server --config config/rampart.yaml --validate
//!
//! # Override settings from the environment
//! RAMPART_TRAINER_INTERVAL=15m rampart-server
//!
//! # Feed fills from a strategy process
//! strategy --emit-fills | rampart-server
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use rampart_core::config::{ConfigFormat, ConfigLoader};
use rampart_server::{RampartServer, ServerConfig};

/// Runs the Rampart safety envelope
#[derive(Parser, Debug)]
#[command(name = "rampart-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "rampart.yaml", env = "RAMPART_CONFIG")]
    config: PathBuf,

    /// Override the state directory
    #[arg(long, env = "RAMPART_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    if args.validate {
        print!("{}", ConfigLoader::serialize(&config, ConfigFormat::Yaml)?);
        eprintln!("{} is valid", args.config.display());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(run_server(config));

    // A blocking stdin read cannot be cancelled; do not wait for it.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = RampartServer::load_config(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    if let Some(dir) = &args.state_dir {
        config.state_dir.clone_from(dir);
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }

    Ok(config)
}

async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let mut server = RampartServer::new(config);
    server.initialize().await?;
    server.run().await?;
    info!("Rampart server stopped");
    Ok(())
}
