//! End-to-end exercise of the HTTP surface against a real in-memory
//! SQLite-backed `AppState`: ingest a signed batch, list it back, and
//! walk an incident through its status DAG.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use hmac::{Hmac, Mac};
use sentinel_api::{routes::api_router, state::AppState};
use sha2::Sha256;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &[u8] = b"test-shared-secret";

async fn setup_state() -> AppState {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("../sentinel-persist/migrations")
        .run(&pool)
        .await
        .unwrap();

    let incidents = sentinel_persist::IncidentStore::new(pool.clone());
    let audit = Arc::new(sentinel_persist::AuditLog::new(pool.clone()).await.unwrap());
    let change_stream = Arc::new(sentinel_persist::ChangeStreamBridge::new(pool));

    AppState::new(incidents, audit, change_stream, SECRET.to_vec())
}

fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_is_ok() {
    let router = api_router(setup_state().await);
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response: Response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ingest_rejects_unsigned_requests() {
    let router = api_router(setup_state().await);
    let body = serde_json::json!([]).to_string();
    let req = Request::builder()
        .method("POST")
        .uri("/ingest")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response: Response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ingest_rejects_bad_signature() {
    let router = api_router(setup_state().await);
    let body = serde_json::json!([]).to_string();
    let req = Request::builder()
        .method("POST")
        .uri("/ingest")
        .header("content-type", "application/json")
        .header("x-signature", "deadbeef")
        .body(Body::from(body))
        .unwrap();
    let response: Response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

fn brute_force_batch() -> String {
    let events: Vec<_> = (0..15)
        .map(|i| {
            let ts = chrono::Utc::now() + chrono::Duration::seconds(i);
            serde_json::json!({
                "ts": ts.to_rfc3339(),
                "source": "fw", "host": "edge-01",
                "entity": {"ip": "10.0.0.7"},
                "object": {"proto": "tcp", "dport": 22},
                "verb": "deny", "outcome": "block"
            })
        })
        .collect();
    serde_json::Value::Array(events).to_string()
}

#[tokio::test]
async fn full_ingest_query_transition_lifecycle() {
    let state = setup_state().await;
    let router = api_router(state.clone());

    // 1. Ingest a signed brute-force batch.
    let body = brute_force_batch();
    let signature = sign(body.as_bytes());
    let req = Request::builder()
        .method("POST")
        .uri("/ingest")
        .header("content-type", "application/json")
        .header("x-signature", signature)
        .body(Body::from(body))
        .unwrap();
    let response: Response = router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ingest_result = body_json(response).await;
    assert_eq!(ingest_result["accepted"], 15);
    assert_eq!(ingest_result["rejected"], 0);

    // 2. The batch should have produced exactly one open incident.
    let req = Request::builder()
        .uri("/incidents?status=open")
        .body(Body::empty())
        .unwrap();
    let response: Response = router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["severity"], "high");
    let incident_id = items[0]["id"].as_str().unwrap().to_string();

    // 3. Fetch it directly.
    let req = Request::builder()
        .uri(format!("/incidents/{incident_id}"))
        .body(Body::empty())
        .unwrap();
    let response: Response = router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // 4. Acknowledge it.
    let transition_body = serde_json::json!({"status": "ack", "actor": "oncall"}).to_string();
    let req = Request::builder()
        .method("POST")
        .uri(format!("/incidents/{incident_id}/status"))
        .header("content-type", "application/json")
        .body(Body::from(transition_body))
        .unwrap();
    let response: Response = router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let incident = body_json(response).await;
    assert_eq!(incident["status"], "ack");

    // 5. A backwards transition (ack -> open) must be rejected.
    let bad_transition = serde_json::json!({"status": "open"}).to_string();
    let req = Request::builder()
        .method("POST")
        .uri(format!("/incidents/{incident_id}/status"))
        .header("content-type", "application/json")
        .body(Body::from(bad_transition))
        .unwrap();
    let response: Response = router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // 6. The audit log should have recorded both the correlation and the
    //    transition, and its hash chain must still verify.
    assert!(state.audit().verify_chain().await.unwrap());
}

#[tokio::test]
async fn get_incident_missing_returns_404() {
    let router = api_router(setup_state().await);
    let req = Request::builder()
        .uri("/incidents/inc_does_not_exist")
        .body(Body::empty())
        .unwrap();
    let response: Response = router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
