//! Hash-chained audit log for incident status transitions.
//!
//! Grounded in the teacher's `AuditStore`/`AuditEvent` chaining scheme,
//! trimmed to what spec.md §4.7 actually asks for: one linear chain
//! over `AuditEntry` rows (no per-tenant partitioning, no Merkle tree,
//! no external SIEM exporters — this crate ships *into* a SIEM, it
//! doesn't need to export to one).

use sentinel_core::AuditEntry;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;

use crate::error::StorageError;

#[derive(Debug, Clone)]
pub struct StoredAuditEntry {
    pub entry: AuditEntry,
    pub hash: String,
    pub previous_hash: Option<String>,
}

#[derive(Debug)]
pub struct AuditLog {
    pool: SqlitePool,
    last_hash: RwLock<Option<String>>,
}

impl AuditLog {
    pub async fn new(pool: SqlitePool) -> Result<Self, StorageError> {
        let last_hash = sqlx::query("SELECT hash FROM audit_log ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
            .map(|row| row.try_get::<String, _>("hash"))
            .transpose()
            .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(Self {
            pool,
            last_hash: RwLock::new(last_hash),
        })
    }

    /// Append `entry`, chaining its hash to the previous entry's.
    pub async fn record(&self, entry: AuditEntry) -> Result<StoredAuditEntry, StorageError> {
        let mut last_hash = self.last_hash.write().await;
        let previous_hash = last_hash.clone();
        let hash = compute_hash(&entry, previous_hash.as_deref());

        sqlx::query(
            "INSERT INTO audit_log (ts, actor, action, incident_id, before, after, hash, previous_hash)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.ts.timestamp())
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.incident_id)
        .bind(entry.before.to_string())
        .bind(entry.after.to_string())
        .bind(&hash)
        .bind(&previous_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        *last_hash = Some(hash.clone());
        Ok(StoredAuditEntry {
            entry,
            hash,
            previous_hash,
        })
    }

    pub async fn for_incident(&self, incident_id: &str) -> Result<Vec<StoredAuditEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM audit_log WHERE incident_id = ? ORDER BY seq ASC",
        )
        .bind(incident_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter().map(row_to_stored).collect()
    }

    /// Walk the whole chain and confirm each entry's stored hash
    /// matches its recomputed hash and links to its predecessor.
    pub async fn verify_chain(&self) -> Result<bool, StorageError> {
        let rows = sqlx::query("SELECT * FROM audit_log ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let mut expected_previous: Option<String> = None;
        for row in rows {
            let stored = row_to_stored(row)?;
            if stored.previous_hash != expected_previous {
                return Ok(false);
            }
            let recomputed = compute_hash(&stored.entry, stored.previous_hash.as_deref());
            if recomputed != stored.hash {
                return Ok(false);
            }
            expected_previous = Some(stored.hash);
        }
        Ok(true)
    }
}

fn compute_hash(entry: &AuditEntry, previous_hash: Option<&str>) -> String {
    let content = format!(
        "{}:{}:{}:{}:{}:{}:{}",
        entry.ts.timestamp(),
        entry.actor,
        entry.action,
        entry.incident_id,
        entry.before,
        entry.after,
        previous_hash.unwrap_or("")
    );
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn row_to_stored(row: sqlx::sqlite::SqliteRow) -> Result<StoredAuditEntry, StorageError> {
    let ts: i64 = row.try_get("ts").map_err(|e| StorageError::Query(e.to_string()))?;
    let before_raw: String = row.try_get("before").map_err(|e| StorageError::Query(e.to_string()))?;
    let after_raw: String = row.try_get("after").map_err(|e| StorageError::Query(e.to_string()))?;

    let entry = AuditEntry {
        ts: chrono::DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| StorageError::Internal("invalid audit_log.ts".into()))?,
        actor: row.try_get("actor").map_err(|e| StorageError::Query(e.to_string()))?,
        action: row.try_get("action").map_err(|e| StorageError::Query(e.to_string()))?,
        incident_id: row.try_get("incident_id").map_err(|e| StorageError::Query(e.to_string()))?,
        before: serde_json::from_str(&before_raw).map_err(|e| StorageError::Serialization(e.to_string()))?,
        after: serde_json::from_str(&after_raw).map_err(|e| StorageError::Serialization(e.to_string()))?,
    };

    Ok(StoredAuditEntry {
        entry,
        hash: row.try_get("hash").map_err(|e| StorageError::Query(e.to_string()))?,
        previous_hash: row.try_get("previous_hash").map_err(|e| StorageError::Query(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn migrated_pool() -> SqlitePool {
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn entry(incident_id: &str, action: &str) -> AuditEntry {
        AuditEntry {
            ts: chrono::Utc::now(),
            actor: "operator:alice".into(),
            action: action.into(),
            incident_id: incident_id.into(),
            before: json!({"status": "open"}),
            after: json!({"status": "ack"}),
        }
    }

    #[tokio::test]
    async fn chain_links_sequential_entries() {
        let log = AuditLog::new(migrated_pool().await).await.unwrap();
        let first = log.record(entry("inc_1", "ack")).await.unwrap();
        let second = log.record(entry("inc_1", "close")).await.unwrap();

        assert!(first.previous_hash.is_none());
        assert_eq!(second.previous_hash, Some(first.hash));
        assert!(log.verify_chain().await.unwrap());
    }

    #[tokio::test]
    async fn for_incident_filters_and_preserves_order() {
        let log = AuditLog::new(migrated_pool().await).await.unwrap();
        log.record(entry("inc_1", "ack")).await.unwrap();
        log.record(entry("inc_2", "ack")).await.unwrap();
        log.record(entry("inc_1", "close")).await.unwrap();

        let chain = log.for_incident("inc_1").await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].entry.action, "ack");
        assert_eq!(chain[1].entry.action, "close");
    }

    #[tokio::test]
    async fn resuming_an_existing_log_continues_the_chain() {
        let pool = migrated_pool().await;
        let first_log = AuditLog::new(pool.clone()).await.unwrap();
        let recorded = first_log.record(entry("inc_1", "ack")).await.unwrap();

        let second_log = AuditLog::new(pool).await.unwrap();
        let next = second_log.record(entry("inc_1", "close")).await.unwrap();
        assert_eq!(next.previous_hash, Some(recorded.hash));
    }
}
