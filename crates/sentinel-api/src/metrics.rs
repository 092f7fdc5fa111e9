//! Observability counters/gauges (spec.md §4.11). No anomaly-scoring
//! model lives here — only the ambient metrics every stage emits.

use metrics::{counter, gauge};

pub fn record_batch(normalized: usize, dropped: usize) {
    counter!("sentinel_events_normalized_total").increment(normalized as u64);
    counter!("sentinel_events_dropped_total").increment(dropped as u64);
    counter!("sentinel_ingest_batches_total").increment(1);
}

pub fn record_active_clusters(count: usize) {
    gauge!("sentinel_active_clusters").set(count as f64);
}

pub fn record_incident_upsert(severity: &str) {
    counter!("sentinel_incidents_total", "severity" => severity.to_string()).increment(1);
}
