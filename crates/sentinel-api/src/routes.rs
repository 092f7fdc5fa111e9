//! HTTP routes: ingest, incident query/transition, and WebSocket fan-out.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

use sentinel_core::{AuditEntry, Incident, Severity, Status};
use sentinel_persist::IncidentFilter;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// --- Ingest (spec.md §4.8) ---------------------------------------------

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
}

const SIGNATURE_HEADER: &str = "x-signature";

fn verify_signature(secret: &[u8], body: &[u8], signature_hex: &str) -> bool {
    let Ok(provided) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    expected.ct_eq(&provided).into()
}

/// Verifies the `X-Signature` header, normalizes, clusters, correlates,
/// and persists a batch of raw events in one request.
pub async fn ingest(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> ApiResult<Json<IngestResponse>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing X-Signature header".to_string()))?;

    if !verify_signature(state.hmac_secret(), &body, signature) {
        return Err(ApiError::Unauthorized("signature mismatch".to_string()));
    }

    let raw: Vec<serde_json::Value> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;

    let mut events = sentinel_core::normalize_batch(&raw);
    metrics::record_batch(events.len(), raw.len().saturating_sub(events.len()));

    {
        let mut clusterer = state.clusterer().lock().await;
        clusterer.assign_clusters(&mut events);
        metrics::record_active_clusters(clusterer.active_cluster_count());
    }

    let open = state
        .incidents()
        .query_incidents(&IncidentFilter {
            status: Some(Status::Open),
            limit: 500,
            ..Default::default()
        })
        .await?;
    let mut incidents: BTreeMap<String, Incident> = open
        .items
        .into_iter()
        .map(|incident| (incident.id.clone(), incident))
        .collect();
    let before_snapshot = incidents.clone();

    let affected = state.correlator().correlate_events(&mut events, &mut incidents);

    state.incidents().insert_events(&events).await?;
    for id in &affected {
        if let Some(incident) = incidents.get(id) {
            state.incidents().upsert_incident(incident).await?;
            metrics::record_incident_upsert(incident.severity.as_str());

            let before = before_snapshot
                .get(id)
                .map(|i| serde_json::to_value(i).unwrap_or(serde_json::Value::Null))
                .unwrap_or(serde_json::Value::Null);
            let after = serde_json::to_value(incident).unwrap_or(serde_json::Value::Null);
            state
                .audit()
                .record(AuditEntry {
                    ts: chrono::Utc::now(),
                    actor: "pipeline:correlator".to_string(),
                    action: "correlate".to_string(),
                    incident_id: id.clone(),
                    before,
                    after,
                })
                .await?;
        }
    }

    Ok(Json(IngestResponse {
        accepted: events.len(),
        rejected: raw.len().saturating_sub(events.len()),
    }))
}

// --- Incident query (spec.md §4.9) --------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListIncidentsQuery {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub entity_ip: Option<String>,
    pub limit: Option<u32>,
    pub after_id: Option<String>,
}

pub async fn list_incidents(
    State(state): State<AppState>,
    Query(q): Query<ListIncidentsQuery>,
) -> ApiResult<Json<sentinel_persist::Page<Incident>>> {
    let filter = IncidentFilter {
        status: q.status.as_deref().map(parse_status).transpose()?,
        severity: q.severity.as_deref().map(parse_severity).transpose()?,
        entity_ip: q.entity_ip,
        after_id: q.after_id,
        limit: q.limit.unwrap_or(50),
    };
    let page = state.incidents().query_incidents(&filter).await?;
    Ok(Json(page))
}

pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Incident>> {
    state
        .incidents()
        .get_incident(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("incident {id} not found")))
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    #[serde(default = "default_actor")]
    pub actor: String,
}

fn default_actor() -> String {
    "operator".to_string()
}

pub async fn transition_incident_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> ApiResult<Json<Incident>> {
    let next = parse_status(&req.status)?;
    let (before, after) = state.incidents().transition_status(&id, next).await?;

    state
        .audit()
        .record(AuditEntry {
            ts: chrono::Utc::now(),
            actor: req.actor,
            action: format!(
                "transition:{}->{}",
                before.status.as_str(),
                after.status.as_str()
            ),
            incident_id: id,
            before: serde_json::to_value(&before).unwrap_or(serde_json::Value::Null),
            after: serde_json::to_value(&after).unwrap_or(serde_json::Value::Null),
        })
        .await?;

    Ok(Json(after))
}

fn parse_status(s: &str) -> ApiResult<Status> {
    match s {
        "open" => Ok(Status::Open),
        "ack" => Ok(Status::Ack),
        "closed" => Ok(Status::Closed),
        other => Err(ApiError::BadRequest(format!("unknown status {other}"))),
    }
}

fn parse_severity(s: &str) -> ApiResult<Severity> {
    match s {
        "low" => Ok(Severity::Low),
        "medium" => Ok(Severity::Medium),
        "high" => Ok(Severity::High),
        "critical" => Ok(Severity::Critical),
        other => Err(ApiError::BadRequest(format!("unknown severity {other}"))),
    }
}

// --- WebSocket fan-out (spec.md §4.10) ----------------------------------

pub async fn ws_incidents(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| relay_changes(socket, state))
}

async fn relay_changes(mut socket: WebSocket, state: AppState) {
    let mut rx = state.change_stream().subscribe();
    loop {
        match rx.recv().await {
            Ok(notification) => {
                let Ok(payload) = serde_json::to_string(&notification) else {
                    continue;
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/incidents", get(list_incidents))
        .route("/incidents/{id}", get(get_incident))
        .route("/incidents/{id}/status", post(transition_incident_status))
        .route("/ws/incidents", get(ws_incidents))
        .with_state(state)
}
