//! Info command - show system information.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct InfoArgs;

pub fn run(_args: InfoArgs) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    println!("{}", "Sentinel SIEM".bold().cyan());
    println!("{}", "=".repeat(40).cyan());
    println!();

    println!("{}", "Version:".bold());
    println!("  {} {}", "sentinel-cli:".dimmed(), version.green());
    println!();

    println!("{}", "Pipeline:".bold());
    println!("  {} normalize -> cluster -> correlate", "1.".dimmed());
    println!("  {} windowed clustering (default 120s window, 0.75 similarity)", "2.".dimmed());
    println!("  {} entity-anchored incident correlation", "3.".dimmed());
    println!();

    println!("{}", "Configuration:".bold());
    println!("  {} SENTINEL_DB_URL, SENTINEL_HMAC_SECRET, SENTINEL_PORT", "env:".dimmed());
    println!();

    Ok(())
}
