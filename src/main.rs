//! Relay Hub Server
//!
//! Run with: cargo run -- [--config PATH] [--port PORT]
//!
//! # Configuration
//!
//! Settings come from a TOML file (see `relay-hub config`), then
//! environment variables, then command-line flags:
//! - `PORT`: Port to listen on (default: 8080)
//! - `RELAY_HOST`: Host to bind to (default: 0.0.0.0)
//! - `RELAY_PUBLIC_URL`: WebSocket URL handed to registering devices
//! - `RELAY_PROBE_INTERVAL_SECS`: Liveness probe interval (default: 30)
//! - `RELAY_LOG_LEVEL` / `RELAY_LOG_FORMAT`: Logging (default: info / pretty)
//! - `RUST_LOG`: Full tracing filter, overrides the log level

use anyhow::Context;
use clap::{Parser, Subcommand};
use relay_hub::config::{generate_default_config, Config, LoggingConfig};
use relay_hub::{serve, AppState};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relay-hub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Realtime relay hub for devices and clients")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hub (default)
    Serve,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Config { output }) = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("writing config to {}", path.display()))?;
                println!("Config written to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_logging(&config.logging);

    tracing::info!("Starting relay hub v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        probe_interval_secs = config.hub.probe_interval_secs,
        max_missed_probes = config.hub.max_missed_probes,
        "Hub settings"
    );

    let state = AppState::new(config.server.clone(), config.hub.hub_config());
    serve(state, &config.server).await?;

    tracing::info!("Relay hub stopped");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("relay_hub={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
