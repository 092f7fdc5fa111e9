//! Sentinel CLI - operator tooling for the Sentinel SIEM
//!
//! # Usage
//!
//! ```bash
//! # Seed a database with demo incidents
//! sentinel seed --db sentinel.db
//!
//! # List stored incidents
//! sentinel incidents --db sentinel.db --status open
//!
//! # Verify audit chain integrity
//! sentinel verify --db sentinel.db
//!
//! # Show version and configuration
//! sentinel info
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{incidents, info, seed, verify};

#[derive(Parser)]
#[command(
    name = "sentinel",
    version,
    about = "Sentinel CLI - operator tooling for the Sentinel SIEM"
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed a database with demo incidents (brute force, auth failures, exfil)
    #[command(name = "seed")]
    Seed(seed::SeedArgs),

    /// List stored incidents
    #[command(name = "incidents")]
    Incidents(incidents::IncidentsArgs),

    /// Verify audit chain integrity
    #[command(name = "verify")]
    Verify(verify::VerifyArgs),

    /// Show system information
    #[command(name = "info")]
    Info(info::InfoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Seed(args) => seed::run(args).await,
        Commands::Incidents(args) => incidents::run(args).await,
        Commands::Verify(args) => verify::run(args).await,
        Commands::Info(args) => info::run(args),
    }
}

fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}
