//! Sentinel Server — standalone entry point wiring persistence, the
//! normalize/cluster/correlate pipeline, and the HTTP/WebSocket API
//! together into a runnable binary.

use anyhow::Result;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Settings {
    db_url: String,
    hmac_secret: String,
}

impl Settings {
    fn from_env() -> Self {
        Self {
            db_url: std::env::var("SENTINEL_DB_URL")
                .unwrap_or_else(|_| "sqlite:sentinel.db?mode=rwc".to_string()),
            hmac_secret: std::env::var("SENTINEL_HMAC_SECRET").unwrap_or_else(|_| {
                tracing::warn!("SENTINEL_HMAC_SECRET not set, using a development-only fallback");
                "dev-only-fallback-secret".to_string()
            }),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    sentinel_api::server::init_tracing();
    tracing::info!("starting sentinel-server");

    let settings = Settings::from_env();
    let server_config = sentinel_api::ServerConfig::from_env();

    use std::str::FromStr;
    let options = sqlx::sqlite::SqliteConnectOptions::from_str(&settings.db_url)
        .map_err(|e| anyhow::anyhow!("invalid SENTINEL_DB_URL: {e}"))?
        .create_if_missing(true)
        .pragma("foreign_keys", "ON")
        .pragma("journal_mode", "WAL");
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!("database connection failed: {e}"))?;
    sqlx::migrate!("../sentinel-persist/migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("migration failed: {e}"))?;

    let incidents = sentinel_persist::IncidentStore::new(pool.clone());
    let audit = Arc::new(
        sentinel_persist::AuditLog::new(pool.clone())
            .await
            .map_err(|e| anyhow::anyhow!("audit log init failed: {e}"))?,
    );
    let change_stream = Arc::new(sentinel_persist::ChangeStreamBridge::new(pool));

    let app_state = sentinel_api::AppState::new(
        incidents,
        audit,
        change_stream,
        settings.hmac_secret.into_bytes(),
    );

    sentinel_api::SentinelServer::new(server_config, app_state)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    Ok(())
}
