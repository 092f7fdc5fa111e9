//! Incidents command - list stored incidents.
//!
//! Usage:
//! ```bash
//! sentinel incidents --db sentinel.db
//! sentinel incidents --db sentinel.db --status open --severity high
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use sentinel_core::{Severity, Status};
use sentinel_persist::IncidentFilter;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Args)]
pub struct IncidentsArgs {
    /// Path to the Sentinel SQLite database
    #[arg(long, short = 'd', value_name = "FILE")]
    db: PathBuf,

    /// Filter by status: open, ack, closed
    #[arg(long)]
    status: Option<String>,

    /// Filter by severity: low, medium, high, critical
    #[arg(long)]
    severity: Option<String>,

    /// Maximum rows to show
    #[arg(long, default_value_t = 50)]
    limit: u32,
}

pub async fn run(args: IncidentsArgs) -> Result<()> {
    let url = format!("sqlite:{}", args.db.display());
    let options = sqlx::sqlite::SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("invalid database path: {}", args.db.display()))?;
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| "failed to open database")?;

    let store = sentinel_persist::IncidentStore::new(pool);
    let filter = IncidentFilter {
        status: args.status.as_deref().map(parse_status).transpose()?,
        severity: args.severity.as_deref().map(parse_severity).transpose()?,
        limit: args.limit,
        ..Default::default()
    };
    let page = store.query_incidents(&filter).await?;

    println!("{}", "Sentinel Incidents".bold().cyan());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Severity").fg(Color::Cyan),
            Cell::new("Title").fg(Color::Cyan),
            Cell::new("Updated").fg(Color::Cyan),
        ]);

    for incident in &page.items {
        table.add_row(vec![
            Cell::new(&incident.id),
            Cell::new(incident.status.as_str()),
            Cell::new(incident.severity.as_str()).fg(severity_color(incident.severity)),
            Cell::new(&incident.title),
            Cell::new(incident.updated_at.to_rfc3339()),
        ]);
    }

    println!("{table}");
    println!();
    println!("{} {} incident(s)", "Shown:".dimmed(), page.items.len());
    if page.next_cursor.is_some() {
        println!("{}", "more results available, narrow the filter or raise --limit".dimmed());
    }

    Ok(())
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Low => Color::Grey,
        Severity::Medium => Color::Yellow,
        Severity::High => Color::DarkYellow,
        Severity::Critical => Color::Red,
    }
}

fn parse_status(s: &str) -> Result<Status> {
    match s {
        "open" => Ok(Status::Open),
        "ack" => Ok(Status::Ack),
        "closed" => Ok(Status::Closed),
        other => anyhow::bail!("unknown status '{other}'"),
    }
}

fn parse_severity(s: &str) -> Result<Severity> {
    match s {
        "low" => Ok(Severity::Low),
        "medium" => Ok(Severity::Medium),
        "high" => Ok(Severity::High),
        "critical" => Ok(Severity::Critical),
        other => anyhow::bail!("unknown severity '{other}'"),
    }
}
