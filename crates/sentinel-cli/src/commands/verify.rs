//! Verify command - check hash-chained audit log integrity.
//!
//! Usage:
//! ```bash
//! sentinel verify --db sentinel.db
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Args)]
pub struct VerifyArgs {
    /// Path to the Sentinel SQLite database
    #[arg(long, short = 'd', value_name = "FILE")]
    db: PathBuf,
}

pub async fn run(args: VerifyArgs) -> Result<()> {
    println!("{}", "Sentinel Audit Verification".bold().cyan());
    println!("{}", "=".repeat(40).cyan());
    println!();

    if !args.db.exists() {
        println!("{} database file not found: {}", "x".red().bold(), args.db.display());
        std::process::exit(1);
    }

    let url = format!("sqlite:{}", args.db.display());
    let options = sqlx::sqlite::SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("invalid database path: {}", args.db.display()))?;
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| "failed to open database")?;

    let audit = sentinel_persist::AuditLog::new(pool)
        .await
        .with_context(|| "failed to load audit log")?;

    println!("  {} {}", "Database:".dimmed(), args.db.display());
    println!();

    if audit.verify_chain().await.with_context(|| "chain verification failed")? {
        println!("{} audit chain integrity verified", "+".green().bold());
    } else {
        println!("{} audit chain integrity FAILED", "x".red().bold());
        println!();
        println!("{}", "the audit chain may have been tampered with".red());
        std::process::exit(1);
    }

    Ok(())
}
