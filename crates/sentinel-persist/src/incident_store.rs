//! Durable storage for events and incidents.

use sentinel_core::{Entity, Event, Incident, Severity, Status};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use crate::error::StorageError;

#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub status: Option<Status>,
    pub severity: Option<Severity>,
    pub entity_ip: Option<String>,
    /// Cursor: the `id` of the last incident seen on the previous page.
    /// Resolved server-side to its `(updated_at, id)` position so ties
    /// on `updated_at` are still ordered deterministically by `id`.
    pub after_id: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Pass as `IncidentFilter::after_id` to fetch the next page.
    pub next_cursor: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("incident {0} not found")]
    NotFound(String),
    #[error("{from} cannot transition to {to}")]
    Invalid { from: &'static str, to: &'static str },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// SQL-backed store for events and incidents.
#[derive(Debug, Clone)]
pub struct IncidentStore {
    pool: SqlitePool,
}

impl IncidentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_events(&self, events: &[Event]) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for event in events {
            let features = serde_json::to_string(&event.features)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            sqlx::query(
                "INSERT INTO events (ts, source, host, trace_id, fingerprint, features, cluster_id, incident_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(event.ts.timestamp())
            .bind(&event.source)
            .bind(&event.host)
            .bind(&event.trace_id)
            .bind(&event.fingerprint)
            .bind(features)
            .bind(&event.cluster_id)
            .bind(&event.incident_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    /// Insert or fully replace an incident. The `incident_change_log`
    /// triggers (see `migrations/0001_init.sql`) fire on both paths.
    pub async fn upsert_incident(&self, incident: &Incident) -> Result<(), StorageError> {
        let entity = serde_json::to_string(&incident.entity)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let cluster_ids = serde_json::to_string(&incident.cluster_ids)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let scores = serde_json::to_string(&incident.scores)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            "INSERT INTO incidents
                (id, status, title, severity, entity, cluster_ids, scores, created_at, updated_at, last_event_ts)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                title = excluded.title,
                severity = excluded.severity,
                entity = excluded.entity,
                cluster_ids = excluded.cluster_ids,
                scores = excluded.scores,
                updated_at = excluded.updated_at,
                last_event_ts = excluded.last_event_ts",
        )
        .bind(&incident.id)
        .bind(incident.status.as_str())
        .bind(&incident.title)
        .bind(incident.severity.as_str())
        .bind(entity)
        .bind(cluster_ids)
        .bind(scores)
        .bind(incident.created_at.timestamp())
        .bind(incident.updated_at.timestamp())
        .bind(incident.last_event_ts.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(())
    }

    pub async fn get_incident(&self, id: &str) -> Result<Option<Incident>, StorageError> {
        let row = sqlx::query("SELECT * FROM incidents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        row.map(row_to_incident).transpose()
    }

    /// Sorted, cursor-paginated query over incidents (spec.md §4.9):
    /// ordered by `updated_at` descending, ties on the same instant
    /// broken by `id` descending so a cursor resumes deterministically
    /// even when two incidents update within the same second.
    pub async fn query_incidents(&self, filter: &IncidentFilter) -> Result<Page<Incident>, StorageError> {
        let limit = filter.limit.clamp(1, 500);

        let cursor = match &filter.after_id {
            Some(after_id) => {
                let incident = self
                    .get_incident(after_id)
                    .await?
                    .ok_or_else(|| StorageError::NotFound(format!("cursor incident {after_id} not found")))?;
                Some((incident.updated_at, incident.id))
            }
            None => None,
        };

        let mut sql = String::from("SELECT * FROM incidents WHERE 1 = 1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.severity.is_some() {
            sql.push_str(" AND severity = ?");
        }
        if filter.entity_ip.is_some() {
            sql.push_str(" AND json_extract(entity, '$.ip') = ?");
        }
        if cursor.is_some() {
            sql.push_str(" AND (updated_at < ? OR (updated_at = ? AND id < ?))");
        }
        sql.push_str(" ORDER BY updated_at DESC, id DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(severity) = filter.severity {
            query = query.bind(severity.as_str());
        }
        if let Some(ip) = &filter.entity_ip {
            query = query.bind(ip);
        }
        if let Some((updated_at, id)) = &cursor {
            query = query.bind(updated_at.timestamp()).bind(updated_at.timestamp()).bind(id);
        }
        // fetch one extra row to know whether another page follows
        query = query.bind(limit as i64 + 1);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let has_more = rows.len() > limit as usize;
        let items: Vec<Incident> = rows
            .into_iter()
            .take(limit as usize)
            .map(row_to_incident)
            .collect::<Result<_, _>>()?;

        let next_cursor = if has_more {
            items.last().map(|i| i.id.clone())
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    /// Validate the status DAG (spec.md §3: `Open -> Ack -> Closed`,
    /// never backwards) and persist the transition atomically.
    pub async fn transition_status(
        &self,
        id: &str,
        next: Status,
    ) -> Result<(Incident, Incident), TransitionError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let row = sqlx::query("SELECT * FROM incidents WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
            .ok_or_else(|| TransitionError::NotFound(id.to_string()))?;
        let before = row_to_incident(row)?;

        if !before.status.can_transition_to(next) {
            return Err(TransitionError::Invalid {
                from: before.status.as_str(),
                to: next.as_str(),
            });
        }

        let now = chrono::Utc::now();
        sqlx::query("UPDATE incidents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(now.timestamp())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let mut after = before.clone();
        after.status = next;
        after.updated_at = now;
        Ok((before, after))
    }
}

fn row_to_incident(row: sqlx::sqlite::SqliteRow) -> Result<Incident, StorageError> {
    let entity_raw: String = row
        .try_get("entity")
        .map_err(|e| StorageError::Query(e.to_string()))?;
    let cluster_ids_raw: String = row
        .try_get("cluster_ids")
        .map_err(|e| StorageError::Query(e.to_string()))?;
    let scores_raw: String = row
        .try_get("scores")
        .map_err(|e| StorageError::Query(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Query(e.to_string()))?;
    let severity: String = row
        .try_get("severity")
        .map_err(|e| StorageError::Query(e.to_string()))?;

    let entity: Entity =
        serde_json::from_str(&entity_raw).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let cluster_ids: Vec<String> = serde_json::from_str(&cluster_ids_raw)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let scores: BTreeMap<String, f64> =
        serde_json::from_str(&scores_raw).map_err(|e| StorageError::Serialization(e.to_string()))?;

    Ok(Incident {
        id: row.try_get("id").map_err(|e| StorageError::Query(e.to_string()))?,
        status: Status::from_str_lossy(&status),
        title: row.try_get("title").map_err(|e| StorageError::Query(e.to_string()))?,
        severity: severity_from_str(&severity),
        entity,
        cluster_ids,
        scores,
        created_at: ts_from_row(&row, "created_at")?,
        updated_at: ts_from_row(&row, "updated_at")?,
        last_event_ts: ts_from_row(&row, "last_event_ts")?,
    })
}

fn severity_from_str(s: &str) -> Severity {
    match s {
        "medium" => Severity::Medium,
        "high" => Severity::High,
        "critical" => Severity::Critical,
        _ => Severity::Low,
    }
}

fn ts_from_row(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<chrono::DateTime<chrono::Utc>, StorageError> {
    let secs: i64 = row.try_get(col).map_err(|e| StorageError::Query(e.to_string()))?;
    chrono::DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StorageError::Internal(format!("invalid timestamp in column {col}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{normalize_batch, Clusterer, ClustererConfig, Correlator, CorrelatorConfig};
    use serde_json::json;

    async fn pool() -> SqlitePool {
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

    fn brute_force_incident() -> (Vec<Event>, BTreeMap<String, Incident>) {
        let raws: Vec<_> = (0..12)
            .map(|i| {
                json!({
                    "source": "fw", "host": "edge-01",
                    "entity": {"ip": "10.0.0.7"},
                    "object": {"proto": "tcp", "dport": 22},
                    "verb": "deny", "outcome": "block",
                    "ts": (chrono::Utc::now() + chrono::Duration::seconds(i)).to_rfc3339(),
                })
            })
            .collect();
        let mut events = normalize_batch(&raws);
        Clusterer::new(ClustererConfig::default()).assign_clusters(&mut events);
        let mut incidents = BTreeMap::new();
        Correlator::new(CorrelatorConfig::default()).correlate_events(&mut events, &mut incidents);
        (events, incidents)
    }

    #[tokio::test]
    async fn insert_and_fetch_incident_round_trips() {
        let store = IncidentStore::new(pool().await);
        let (events, incidents) = brute_force_incident();
        store.insert_events(&events).await.unwrap();
        for incident in incidents.values() {
            store.upsert_incident(incident).await.unwrap();
        }

        let (_, incident) = incidents.iter().next().unwrap();
        let fetched = store.get_incident(&incident.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, incident.id);
        assert_eq!(fetched.severity, incident.severity);
        assert_eq!(fetched.cluster_ids, incident.cluster_ids);
    }

    #[tokio::test]
    async fn query_incidents_filters_by_status_and_severity() {
        let store = IncidentStore::new(pool().await);
        let (_, incidents) = brute_force_incident();
        for incident in incidents.values() {
            store.upsert_incident(incident).await.unwrap();
        }

        let page = store
            .query_incidents(&IncidentFilter {
                status: Some(Status::Open),
                severity: Some(Severity::High),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.next_cursor.is_none());

        let empty = store
            .query_incidents(&IncidentFilter {
                severity: Some(Severity::Critical),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(empty.items.is_empty());
    }

    #[tokio::test]
    async fn transition_status_rejects_backwards_moves() {
        let store = IncidentStore::new(pool().await);
        let (_, incidents) = brute_force_incident();
        let incident = incidents.values().next().unwrap().clone();
        store.upsert_incident(&incident).await.unwrap();

        let (before, after) = store
            .transition_status(&incident.id, Status::Ack)
            .await
            .unwrap();
        assert_eq!(before.status, Status::Open);
        assert_eq!(after.status, Status::Ack);

        let err = store
            .transition_status(&incident.id, Status::Open)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::Invalid { .. }));
    }

    #[tokio::test]
    async fn query_incidents_pages_deterministically_on_tied_updated_at() {
        let store = IncidentStore::new(pool().await);
        let now = chrono::Utc::now();
        let mut ids = Vec::new();
        for i in 0..5 {
            let (_, incidents) = brute_force_incident();
            let mut incident = incidents.values().next().unwrap().clone();
            incident.id = format!("inc_tied_{i}");
            incident.updated_at = now;
            store.upsert_incident(&incident).await.unwrap();
            ids.push(incident.id);
        }
        ids.sort();
        ids.reverse();

        let first = store
            .query_incidents(&IncidentFilter {
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.items[0].id, ids[0]);
        assert_eq!(first.items[1].id, ids[1]);
        let cursor = first.next_cursor.clone().unwrap();
        assert_eq!(cursor, ids[1]);

        let second = store
            .query_incidents(&IncidentFilter {
                limit: 2,
                after_id: Some(cursor),
                ..Default::default()
            })
            .await
            .unwrap();
        let second_ids: Vec<&str> = second.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(second_ids, vec![ids[2].as_str(), ids[3].as_str()]);
    }

    #[tokio::test]
    async fn transition_status_missing_incident_is_not_found() {
        let store = IncidentStore::new(pool().await);
        let err = store
            .transition_status("inc_does_not_exist", Status::Ack)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotFound(_)));
    }
}
