//! Shared application state threaded through every handler.

use sentinel_core::{Clusterer, ClustererConfig, Correlator, CorrelatorConfig};
use sentinel_persist::{AuditLog, ChangeStreamBridge, IncidentStore};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cloned into every handler. The clusterer is the only piece of
/// in-process mutable state — it owns the live window of clusters and
/// must see every batch through a single lock, exactly like
/// `sentinel_core::Clusterer`'s single-writer contract demands.
#[derive(Clone)]
pub struct AppState {
    clusterer: Arc<Mutex<Clusterer>>,
    correlator: Arc<Correlator>,
    incidents: IncidentStore,
    audit: Arc<AuditLog>,
    change_stream: Arc<ChangeStreamBridge>,
    hmac_secret: Arc<Vec<u8>>,
}

impl AppState {
    pub fn new(
        incidents: IncidentStore,
        audit: Arc<AuditLog>,
        change_stream: Arc<ChangeStreamBridge>,
        hmac_secret: Vec<u8>,
    ) -> Self {
        Self {
            clusterer: Arc::new(Mutex::new(Clusterer::new(ClustererConfig::default()))),
            correlator: Arc::new(Correlator::new(CorrelatorConfig::default())),
            incidents,
            audit,
            change_stream,
            hmac_secret: Arc::new(hmac_secret),
        }
    }

    pub fn clusterer(&self) -> &Mutex<Clusterer> {
        &self.clusterer
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn incidents(&self) -> &IncidentStore {
        &self.incidents
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn change_stream(&self) -> &ChangeStreamBridge {
        &self.change_stream
    }

    pub fn hmac_secret(&self) -> &[u8] {
        &self.hmac_secret
    }
}
