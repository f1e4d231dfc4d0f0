//! latscaled — the latscale daemon.
//!
//! Single binary that assembles the autoscaler:
//! - State store (redb)
//! - HTTP latency sampler
//! - Reconciler + work-queue controller
//! - REST API
//!
//! # Usage
//!
//! ```text
//! latscaled run --config /etc/latscale/latscale.toml --data-dir /var/lib/latscale
//! latscaled check-config --config /etc/latscale/latscale.toml
//! ```

mod daemon;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use latscale_core::LatscaleConfig;

#[derive(Parser)]
#[command(name = "latscaled", about = "Latency-driven replica autoscaler")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller and the API server until Ctrl-C.
    Run {
        /// Path to latscale.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/latscale")]
        data_dir: PathBuf,

        /// API port; overrides `api.port`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Parse and validate a config file, then print the effective config.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            data_dir,
            port,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.api.port = port;
            }
            daemon::run(config, data_dir).await
        }
        Command::CheckConfig { config } => {
            let config = load_config(Some(&config))?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,latscale=debug"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Load and validate the config, falling back to defaults without a path.
fn load_config(path: Option<&Path>) -> anyhow::Result<LatscaleConfig> {
    let config = match path {
        Some(path) => {
            let config = LatscaleConfig::from_file(path)
                .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
            info!(path = %path.display(), "config loaded");
            config
        }
        None => LatscaleConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
