//! # Sentinel Core
//!
//! Pure and in-process-stateful pieces of the Sentinel SIEM pipeline:
//! ID generation, event normalization, windowed clustering, and
//! entity correlation.
//!
//! ## Pipeline
//!
//! ```text
//! raw JSON batch -> normalize_batch -> Clusterer::assign_clusters
//!                -> Correlator::correlate_events -> (persistence)
//! ```
//!
//! Nothing in this crate touches disk or the network; persistence and
//! fan-out live in `sentinel-persist` and `sentinel-api`.

pub mod clusterer;
pub mod correlator;
pub mod ids;
pub mod normalizer;
pub mod types;

pub use clusterer::{Clusterer, ClustererConfig};
pub use correlator::{Correlator, CorrelatorConfig};
pub use ids::{cluster_id, incident_id, trace_id};
pub use normalizer::normalize_batch;
pub use types::{
    Alert, AlertAction, AuditEntry, Entity, Event, Incident, MetricPoint, Severity, Status,
};
