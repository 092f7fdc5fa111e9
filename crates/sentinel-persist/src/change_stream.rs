//! Change-stream bridge.
//!
//! The original system watched a MongoDB change stream for incident
//! inserts/updates and forwarded them to subscribers. There is no
//! equivalent primitive in SQLite, so this polls the append-only
//! `incident_change_log` table (populated by triggers in
//! `migrations/0001_init.sql`) using its `seq` column as a resume
//! cursor, and fans the results out over a broadcast channel instead
//! of a callback.

use sqlx::{Row, SqlitePool};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChangeNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub doc: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Background poller with `start`/`stop`/`is_running`, mirroring the
/// watcher lifecycle of the original `ChangeStreamWatcher`.
pub struct ChangeStreamBridge {
    pool: SqlitePool,
    sender: broadcast::Sender<ChangeNotification>,
    running: Arc<AtomicBool>,
    last_seq: Arc<AtomicI64>,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChangeStreamBridge {
    pub fn new(pool: SqlitePool) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            pool,
            sender,
            running: Arc::new(AtomicBool::new(false)),
            last_seq: Arc::new(AtomicI64::new(0)),
            handle: tokio::sync::Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.sender.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn start(&self, poll_interval: Duration) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let pool = self.pool.clone();
        let sender = self.sender.clone();
        let running = self.running.clone();
        let last_seq = self.last_seq.clone();

        let handle = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                match poll_once(&pool, last_seq.load(Ordering::SeqCst)).await {
                    Ok(rows) => {
                        for (seq, notification) in rows {
                            last_seq.store(seq, Ordering::SeqCst);
                            // A lagging or absent subscriber is not an
                            // error for the bridge itself.
                            let _ = sender.send(notification);
                        }
                        tokio::time::sleep(poll_interval).await;
                    }
                    Err(error) => {
                        tracing::error!(%error, "change_stream_poll_failed, reconnecting");
                        metrics::counter!("sentinel_change_stream_reconnects_total").increment(1);
                        tokio::time::sleep(DEFAULT_RECONNECT_DELAY).await;
                    }
                }
            }
        });

        *self.handle.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }
}

async fn poll_once(
    pool: &SqlitePool,
    after_seq: i64,
) -> Result<Vec<(i64, ChangeNotification)>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT seq, incident_id, op, doc, ts FROM incident_change_log
         WHERE seq > ? ORDER BY seq ASC LIMIT 100",
    )
    .bind(after_seq)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let seq: i64 = row.try_get("seq")?;
        let op: String = row.try_get("op")?;
        let doc_raw: String = row.try_get("doc")?;
        let ts: i64 = row.try_get("ts")?;
        let doc: serde_json::Value = serde_json::from_str(&doc_raw).unwrap_or(serde_json::Value::Null);
        let timestamp = chrono::DateTime::from_timestamp(ts, 0).unwrap_or_else(chrono::Utc::now);
        out.push((
            seq,
            ChangeNotification {
                kind: op,
                doc,
                timestamp,
            },
        ));
    }
    Ok(out)
}
