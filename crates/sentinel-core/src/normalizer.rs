//! Raw JSON -> [`Event`]: timestamp adoption, field allow-listing,
//! secret redaction, and fingerprinting.

use crate::ids;
use crate::types::{Event, Features};
use serde_json::Value;
use sha2::{Digest, Sha256};

const SECRET_FIELDS: &[&str] = &["password", "token", "api_key", "secret", "credential"];

/// Normalize a batch of raw event JSON. Malformed items are dropped
/// with a warning; the batch call itself never fails, and the order
/// of successful items is preserved.
pub fn normalize_batch(raw: &[Value]) -> Vec<Event> {
    let mut events = Vec::with_capacity(raw.len());
    for item in raw {
        match normalize_one(item) {
            Ok(event) => events.push(event),
            Err(reason) => tracing::warn!(reason, "normalization_failed"),
        }
    }
    events
}

fn normalize_one(raw: &Value) -> Result<Event, &'static str> {
    let Value::Object(obj) = raw else {
        return Err("raw event is not a JSON object");
    };

    let ts = obj
        .get("ts")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or_else(chrono::Utc::now);

    let source = string_or_default(obj, "source");
    let host = string_or_default(obj, "host");
    let trace_id = ids::trace_id();

    let mut features = Features::new();
    if let Some(v) = obj.get("verb") {
        features.insert("verb".to_string(), v.clone());
    }
    if let Some(v) = obj.get("outcome") {
        features.insert("outcome".to_string(), v.clone());
    }
    if let Some(Value::Object(object)) = obj.get("object") {
        for key in ["proto", "dport", "sport", "user"] {
            if let Some(v) = object.get(key) {
                features.insert(key.to_string(), v.clone());
            }
        }
    }
    if let Some(Value::Object(entity)) = obj.get("entity") {
        for key in ["ip", "user"] {
            if let Some(v) = entity.get(key) {
                features.insert(key.to_string(), v.clone());
            }
        }
    }

    redact_secrets(&mut features);

    let fingerprint = compute_fingerprint(&source, &host, &features);

    Ok(Event {
        ts,
        source,
        host,
        trace_id,
        fingerprint,
        features,
        cluster_id: None,
        incident_id: None,
    })
}

fn string_or_default(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parse `YYYY-MM-DDTHH:MM:SS[Z]`. Anything else is treated as absent
/// (the caller falls back to `now()`), per spec.md §4.2.
fn parse_timestamp(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&chrono::Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Recursively replace any object value whose key matches the
/// redaction set with `"***REDACTED***"`.
fn redact_secrets(value: &mut Features) {
    for (key, val) in value.iter_mut() {
        if SECRET_FIELDS.contains(&key.as_str()) {
            *val = Value::String("***REDACTED***".to_string());
        } else if let Value::Object(nested) = val {
            redact_secrets(nested);
        }
    }
}

/// SHA-256 over `source:host:ip:proto:dport`, first 8 bytes hex
/// encoded (16 lowercase hex chars). Redaction never touches `ip`,
/// `proto`, or `dport`, so it can never change a fingerprint.
fn compute_fingerprint(source: &str, host: &str, features: &Features) -> String {
    let ip = features
        .get("ip")
        .and_then(Value::as_str)
        .unwrap_or("none");
    let proto = features
        .get("proto")
        .and_then(Value::as_str)
        .unwrap_or("none");
    let dport = features
        .get("dport")
        .and_then(Value::as_i64)
        .map(|p| p.to_string())
        .unwrap_or_else(|| "0".to_string());

    let raw = format!("{source}:{host}:{ip}:{proto}:{dport}");
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(&digest[..8])
}

/// One-hot feature vector consumed by the clusterer's similarity
/// function: `"<name>_<value>" -> 1` for each nominal feature present.
pub fn extract_features(event: &Event) -> Features {
    let mut out = Features::new();
    for key in ["verb", "proto", "outcome"] {
        if let Some(v) = event.feature_str(key) {
            out.insert(format!("{key}_{v}"), Value::from(1));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_deterministic_and_16_hex_chars() {
        let raw = json!({
            "source": "fw", "host": "edge-01",
            "entity": {"ip": "10.0.0.7"},
            "object": {"proto": "tcp", "dport": 22}
        });
        let a = normalize_batch(std::slice::from_ref(&raw));
        let b = normalize_batch(&[raw]);
        assert_eq!(a[0].fingerprint, b[0].fingerprint);
        assert_eq!(a[0].fingerprint.len(), 16);
        assert!(a[0].fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_differs_when_any_component_differs() {
        let base = json!({
            "source": "fw", "host": "edge-01",
            "entity": {"ip": "10.0.0.7"},
            "object": {"proto": "tcp", "dport": 22}
        });
        let mut other = base.clone();
        other["entity"]["ip"] = json!("10.0.0.8");
        let events = normalize_batch(&[base, other]);
        assert_ne!(events[0].fingerprint, events[1].fingerprint);
    }

    #[test]
    fn redaction_strips_secret_values() {
        let raw = json!({
            "verb": "auth",
            "entity": {"password": "s3cr3t", "ip": "10.0.0.1"}
        });
        let events = normalize_batch(&[raw]);
        let serialized = serde_json::to_string(&events[0]).unwrap();
        assert!(!serialized.contains("s3cr3t"));
    }

    #[test]
    fn redaction_does_not_alter_fingerprint() {
        let with_secret = json!({
            "source": "app", "host": "web-1",
            "entity": {"ip": "10.0.0.1", "password": "hunter2"}
        });
        let without_secret = json!({
            "source": "app", "host": "web-1",
            "entity": {"ip": "10.0.0.1"}
        });
        let events = normalize_batch(&[with_secret, without_secret]);
        assert_eq!(events[0].fingerprint, events[1].fingerprint);
    }

    #[test]
    fn missing_source_and_host_default_to_unknown() {
        let events = normalize_batch(&[json!({})]);
        assert_eq!(events[0].source, "unknown");
        assert_eq!(events[0].host, "unknown");
        assert!(!events[0].fingerprint.is_empty());
        assert!(!events[0].trace_id.is_empty());
    }

    #[test]
    fn malformed_items_are_dropped_without_failing_the_batch() {
        let events = normalize_batch(&[json!("not an object"), json!({"source": "fw"})]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn iso8601_timestamp_is_adopted() {
        let events = normalize_batch(&[json!({"ts": "2025-01-02T03:04:05Z"})]);
        assert_eq!(events[0].ts.to_rfc3339(), "2025-01-02T03:04:05+00:00");
    }

    #[test]
    fn unparseable_timestamp_falls_back_to_now() {
        let before = chrono::Utc::now();
        let events = normalize_batch(&[json!({"ts": "not-a-date"})]);
        assert!(events[0].ts >= before);
    }

    #[test]
    fn extract_features_is_one_hot() {
        let events = normalize_batch(&[json!({"verb": "deny", "outcome": "block"})]);
        let one_hot = extract_features(&events[0]);
        assert_eq!(one_hot.get("verb_deny"), Some(&Value::from(1)));
        assert_eq!(one_hot.get("outcome_block"), Some(&Value::from(1)));
    }
}
