//! Seed command - populate a database with demo incidents.
//!
//! Mirrors the three demo scenarios from the original seeder: SSH
//! brute force via firewall denies, application auth failures, and a
//! large anomalous upload treated as exfiltration.
//!
//! Usage:
//! ```bash
//! sentinel seed --db sentinel.db
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sentinel_core::{normalize_batch, Clusterer, ClustererConfig, Correlator, CorrelatorConfig};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Args)]
pub struct SeedArgs {
    /// Path to the Sentinel SQLite database (created if missing)
    #[arg(long, short = 'd', value_name = "FILE")]
    db: std::path::PathBuf,
}

pub async fn run(args: SeedArgs) -> Result<()> {
    println!("{}", "Sentinel Demo Data Seeder".bold().cyan());
    println!("{}", "=".repeat(40).cyan());
    println!();

    let url = format!("sqlite:{}", args.db.display());
    let options = sqlx::sqlite::SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("invalid database path: {}", args.db.display()))?
        .create_if_missing(true);
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| "failed to open database")?;
    sqlx::migrate!("../sentinel-persist/migrations")
        .run(&pool)
        .await
        .with_context(|| "migration failed")?;

    let store = sentinel_persist::IncidentStore::new(pool);

    println!("Seeding firewall deny events (SSH brute force)...");
    seed_scenario(&store, firewall_brute_force_events()).await?;

    println!("Seeding application auth failures...");
    seed_scenario(&store, app_auth_failure_events()).await?;

    println!("Seeding anomalous upload (exfiltration)...");
    seed_scenario(&store, anomalous_upload_events()).await?;

    println!();
    println!("{} demo data seeded into {}", "+".green().bold(), args.db.display());
    Ok(())
}

async fn seed_scenario(
    store: &sentinel_persist::IncidentStore,
    raw: Vec<serde_json::Value>,
) -> Result<()> {
    let mut events = normalize_batch(&raw);
    Clusterer::new(ClustererConfig::default()).assign_clusters(&mut events);

    let mut incidents = BTreeMap::new();
    let affected = Correlator::new(CorrelatorConfig::default())
        .correlate_events(&mut events, &mut incidents);

    store.insert_events(&events).await?;
    for id in &affected {
        if let Some(incident) = incidents.get(id) {
            store.upsert_incident(incident).await?;
            println!("  created/updated incident: {id}");
        }
    }
    Ok(())
}

fn firewall_brute_force_events() -> Vec<serde_json::Value> {
    (0..15)
        .map(|i| {
            json!({
                "ts": (chrono::Utc::now() + chrono::Duration::seconds(i)).to_rfc3339(),
                "source": "fw",
                "host": "edge-01",
                "entity": {"ip": "10.0.0.7"},
                "verb": "deny",
                "object": {"proto": "tcp", "dport": 22, "bytes": 184},
                "outcome": "block",
            })
        })
        .collect()
}

fn app_auth_failure_events() -> Vec<serde_json::Value> {
    (0..8)
        .map(|i| {
            json!({
                "ts": (chrono::Utc::now() + chrono::Duration::seconds(i * 5)).to_rfc3339(),
                "source": "app",
                "host": "web-02",
                "entity": {"ip": "203.0.113.9", "user": "alice"},
                "verb": "auth",
                "object": {"user": "alice"},
                "outcome": "fail",
            })
        })
        .collect()
}

fn anomalous_upload_events() -> Vec<serde_json::Value> {
    (0..6)
        .map(|i| {
            json!({
                "ts": (chrono::Utc::now() + chrono::Duration::seconds(i * 3)).to_rfc3339(),
                "source": "ids",
                "host": "sensor-03",
                "entity": {"ip": "192.168.1.50"},
                "verb": "upload",
                "object": {"proto": "https", "dport": 443, "bytes": 10_485_760},
                "outcome": "alert",
            })
        })
        .collect()
}
