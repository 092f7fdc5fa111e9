//! Entity-based correlation: groups events by entity key and
//! promotes each group into a new or existing [`Incident`].

use crate::ids;
use crate::types::{Entity, Event, Incident, Severity, Status};
use std::collections::BTreeMap;

/// `window_seconds` is informational only here; the clusterer is the
/// component that actually enforces a window.
#[derive(Debug, Clone, Copy)]
pub struct CorrelatorConfig {
    pub window_seconds: i64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self { window_seconds: 120 }
    }
}

#[derive(Debug, Default)]
pub struct Correlator {
    config: CorrelatorConfig,
}

impl Correlator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self { config }
    }

    /// Group `events` by entity key, then for each group find-or-create
    /// an incident in `incidents` (caller-owned, mutated in place).
    /// Returns the list of affected incident IDs, one per group, in
    /// entity-key order.
    pub fn correlate_events(
        &self,
        events: &mut [Event],
        incidents: &mut BTreeMap<String, Incident>,
    ) -> Vec<String> {
        let _ = self.config.window_seconds;

        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, event) in events.iter().enumerate() {
            groups
                .entry(event.entity_key().to_string())
                .or_default()
                .push(i);
        }

        let now = chrono::Utc::now();
        let mut affected = Vec::with_capacity(groups.len());

        for (entity_key, indices) in &groups {
            let incident_id = self.resolve_incident_for_group(
                entity_key,
                &indices.iter().map(|&i| &events[i]).collect::<Vec<_>>(),
                incidents,
                now,
            );

            for &i in indices {
                let _ = events[i].assign_incident_id(incident_id.clone());
            }
            affected.push(incident_id);
        }

        affected
    }

    fn resolve_incident_for_group(
        &self,
        entity_key: &str,
        group: &[&Event],
        incidents: &mut BTreeMap<String, Incident>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> String {
        if let Some(existing) = group.iter().find_map(|e| e.incident_id.clone()) {
            self.update_incident(&existing, group, incidents, now);
            return existing;
        }

        if let Some(id) = incidents
            .iter()
            .find(|(_, inc)| {
                inc.status == Status::Open && entity_key_of(inc).as_deref() == Some(entity_key)
            })
            .map(|(id, _)| id.clone())
        {
            self.update_incident(&id, group, incidents, now);
            return id;
        }

        self.create_incident(group, incidents, now)
    }

    fn create_incident(
        &self,
        group: &[&Event],
        incidents: &mut BTreeMap<String, Incident>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> String {
        let id = ids::incident_id();
        let first = group[0];
        let last_event_ts = group.last().expect("group is non-empty").ts;

        let mut scores = std::collections::BTreeMap::new();
        scores.insert("anomaly".to_string(), 0.85);
        scores.insert("confidence".to_string(), 0.80);

        let incident = Incident {
            id: id.clone(),
            status: Status::Open,
            title: generate_title(group),
            severity: determine_severity(group),
            entity: Entity {
                ip: first.feature_str("ip").map(str::to_string),
                host: Some(first.host.clone()),
                user: first.feature_str("user").map(str::to_string),
            },
            cluster_ids: dedup_cluster_ids(group),
            scores,
            created_at: now,
            updated_at: now,
            last_event_ts,
        };
        incidents.insert(id.clone(), incident);
        id
    }

    fn update_incident(
        &self,
        id: &str,
        group: &[&Event],
        incidents: &mut BTreeMap<String, Incident>,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        let Some(incident) = incidents.get_mut(id) else {
            return;
        };
        incident.updated_at = now;
        let last_event_ts = group.last().expect("group is non-empty").ts;
        if last_event_ts > incident.last_event_ts {
            incident.last_event_ts = last_event_ts;
        }
        incident.union_cluster_ids(dedup_cluster_ids(group));
        incident.severity = determine_severity(group);
    }
}

fn entity_key_of(incident: &Incident) -> Option<String> {
    incident
        .entity
        .ip
        .clone()
        .or_else(|| incident.entity.host.clone())
}

fn dedup_cluster_ids(group: &[&Event]) -> Vec<String> {
    let mut ids = Vec::new();
    for event in group {
        if let Some(id) = &event.cluster_id {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
    }
    ids
}

/// Tally the group's `verb` values; most frequent wins, ties broken
/// by first-seen.
fn generate_title(group: &[&Event]) -> String {
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for event in group {
        if let Some(verb) = event.feature_str("verb") {
            match tally.iter_mut().find(|(v, _)| *v == verb) {
                Some(entry) => entry.1 += 1,
                None => tally.push((verb, 1)),
            }
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for &(verb, count) in &tally {
        if best.map(|(_, c)| count > c).unwrap_or(true) {
            best = Some((verb, count));
        }
    }

    let source = group[0].source.as_str();
    match best {
        Some((verb, count)) if verb == "auth" && count >= 5 => "SSH brute force attempt".to_string(),
        Some(("deny", _)) => "Repeated access denials".to_string(),
        Some(("exfil", _)) | Some(("upload", _)) => "Data exfiltration detected".to_string(),
        Some((verb, _)) => format!("{verb} on {source}"),
        None => format!("activity on {source}"),
    }
}

/// Severity ladder driven solely by the four counters below (spec.md
/// §4.4.2): exfil/malware presence, and deny/fail counts.
fn determine_severity(group: &[&Event]) -> Severity {
    let mut has_exfil = false;
    let mut has_malware = false;
    let mut deny_count = 0u32;
    let mut fail_count = 0u32;

    for event in group {
        match event.feature_str("outcome") {
            Some("deny") | Some("block") => deny_count += 1,
            Some("fail") => fail_count += 1,
            _ => {}
        }
        match event.feature_str("verb") {
            Some("exfil") | Some("upload") => has_exfil = true,
            Some("malware") => has_malware = true,
            _ => {}
        }
    }

    if has_exfil || has_malware {
        Severity::Critical
    } else if fail_count >= 10 || deny_count >= 10 {
        Severity::High
    } else if fail_count >= 5 || deny_count >= 5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
