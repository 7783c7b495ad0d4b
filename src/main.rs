//! Switchboard Server
//!
//! Serves the echo route over WebSockets.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Mutex;
use switchboard::config::generate_default_config;
use switchboard::{echo, server, Config, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Route WebSocket messages to typed handlers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server
    Serve {
        /// Config file (default: search the standard locations)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the default config file
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => {
            let mut config = match config {
                Some(path) => Config::load_with_env(&path)?,
                None => Config::load_default(),
            };
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            init_tracing(&config.logging)?;
            tracing::info!("Switchboard v{}", env!("CARGO_PKG_VERSION"));

            let state = echo::app_state(config.server)?;
            server::serve(state).await?;
        }
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    println!("Wrote default config to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("switchboard={},tower_http=info", logging.level))
    });

    let file = match &logging.file {
        Some(path) => Some(Mutex::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?,
        )),
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match (logging.is_json(), file) {
        (true, Some(file)) => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(file))
            .init(),
        (true, None) => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        (false, Some(file)) => registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file))
            .init(),
        (false, None) => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    Ok(())
}
