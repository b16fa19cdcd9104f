//! camlink CLI
//!
//! Command-line tools for cameras that speak the camlink property protocol.
//!
//! # Commands
//!
//! - `watch` - Mirror properties and print every change
//! - `system` - Print the device's system information
//! - `get` - Print the current value of one property
//! - `set` - Change a property and print the confirmed value
//! - `emulate` - Run an emulated camera

mod commands;

use camlink_client::{ClientConfig, DEFAULT_BASE_URL};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// camlink camera tools.
#[derive(Parser)]
#[command(name = "camlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the camera's control API
    #[arg(global = true, short, long, env = "CAMLINK_URL", default_value = DEFAULT_BASE_URL)]
    url: String,

    /// Seconds to wait for the camera before giving up
    #[arg(global = true, short, long, default_value = "10")]
    timeout: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror properties and print each change as a JSON line
    Watch {
        /// Property to watch (repeatable; default: every advertised property)
        #[arg(short, long = "property")]
        properties: Vec<String>,
    },

    /// Print the device's system information
    System,

    /// Print the current value of a property
    Get {
        /// Property name, e.g. /video/gain
        name: String,
    },

    /// Change a property and print the value the camera confirms
    Set {
        /// Property name, e.g. /video/whiteBalance
        name: String,

        /// JSON object with the fields to change, e.g. '{"whiteBalance": 5600}'
        value: String,
    },

    /// Run an emulated camera
    Emulate {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::new(cli.url);
    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Watch { properties } => {
            commands::watch::run(config, &properties, timeout).await?;
        }
        Commands::System => {
            commands::system::run(config).await?;
        }
        Commands::Get { name } => {
            commands::get::run(config, &name, timeout).await?;
        }
        Commands::Set { name, value } => {
            commands::set::run(config, &name, &value, timeout).await?;
        }
        Commands::Emulate { bind } => {
            commands::emulate::run(bind).await?;
        }
        Commands::Version => {
            println!("camlink CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
