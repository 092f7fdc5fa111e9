//! Data model: `Event`, `Incident`, and the smaller shapes that ride
//! alongside them (`Alert`, `AuditEntry`, `MetricPoint`).
//!
//! `Cluster` is intentionally not here — it is in-memory-only state
//! owned exclusively by [`crate::clusterer::Clusterer`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semi-structured feature bag: `verb`, `proto`, `dport`, `sport`,
/// `outcome`, `ip`, `user`, `bytes`, one-hot keys, etc. Values are
/// JSON scalars (never nested objects past the top level, since
/// `normalize` flattens everything it keeps).
pub type Features = serde_json::Map<String, serde_json::Value>;

/// A normalized, immutable observation. `fingerprint` and `trace_id`
/// are non-empty for every event leaving the normalizer.
/// `cluster_id` and `incident_id` are set exactly once, by the
/// clusterer and correlator respectively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub source: String,
    pub host: String,
    pub trace_id: String,
    pub fingerprint: String,
    pub features: Features,
    pub cluster_id: Option<String>,
    pub incident_id: Option<String>,
}

impl Event {
    /// Assign a cluster ID. Errors if one is already set — the
    /// clusterer is the only writer and only ever writes once per
    /// event (spec.md §3 invariant).
    pub fn assign_cluster_id(&mut self, cluster_id: String) -> Result<(), AlreadyAssigned> {
        if self.cluster_id.is_some() {
            return Err(AlreadyAssigned("cluster_id"));
        }
        self.cluster_id = Some(cluster_id);
        Ok(())
    }

    /// Assign an incident ID. Errors if one is already set.
    pub fn assign_incident_id(&mut self, incident_id: String) -> Result<(), AlreadyAssigned> {
        if self.incident_id.is_some() {
            return Err(AlreadyAssigned("incident_id"));
        }
        self.incident_id = Some(incident_id);
        Ok(())
    }

    /// Convenience accessor used by the correlator's entity-key logic:
    /// `features.ip` if present, else `host`.
    pub fn entity_key(&self) -> &str {
        self.features
            .get("ip")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.host)
    }

    pub fn feature_str(&self, key: &str) -> Option<&str> {
        self.features.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0} is already assigned and may only be set once")]
pub struct AlreadyAssigned(pub &'static str);

/// Incident status. Transitions form a DAG: `Open -> Ack -> Closed`,
/// enforced by the operator surface (`sentinel-api`), never by the
/// core pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Open,
    Ack,
    Closed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::Ack => "ack",
            Status::Closed => "closed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "ack" => Status::Ack,
            "closed" => Status::Closed,
            _ => Status::Open,
        }
    }

    /// Whether `self -> next` is a forward move in the DAG (never
    /// backwards, never a self-loop).
    pub fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Open, Status::Ack)
                | (Status::Open, Status::Closed)
                | (Status::Ack, Status::Closed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Entity anchoring an incident: at least one of `ip`, `host`, `user`
/// is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// A persisted, entity-anchored grouping of clusters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub status: Status,
    pub title: String,
    pub severity: Severity,
    pub entity: Entity,
    /// Deduplicated, stable insertion order.
    pub cluster_ids: Vec<String>,
    pub scores: BTreeMap<String, f64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub last_event_ts: chrono::DateTime<chrono::Utc>,
}

impl Incident {
    /// Union `new_ids` into `cluster_ids`, preserving prior order and
    /// appending only ids not already present (spec.md §3 invariant:
    /// deduplicated, order stable across updates).
    pub fn union_cluster_ids<I: IntoIterator<Item = String>>(&mut self, new_ids: I) {
        for id in new_ids {
            if !self.cluster_ids.contains(&id) {
                self.cluster_ids.push(id);
            }
        }
    }
}

/// Response action taken against an incident (produced by an
/// out-of-core response subsystem; modeled here only as data so the
/// audit writer and fan-out can carry it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    Block,
    Notify,
    Isolate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub incident_id: String,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub action: AlertAction,
    pub reason: String,
    pub result: String,
}

/// One entry in the hash-chained audit log (see
/// `sentinel-persist::audit`). The type itself carries no hashing
/// logic — that belongs to the store, which knows the chain's prior
/// hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub actor: String,
    pub action: String,
    pub incident_id: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
}

/// A single observability data point. Not persisted by the core;
/// `sentinel-api::metrics` emits the `metrics` crate's own
/// counters/gauges instead of storing these — this type exists for
/// any caller that wants to carry a point across a boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub name: String,
    pub value: f64,
    pub labels: serde_json::Value,
}
