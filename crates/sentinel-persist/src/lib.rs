//! # Sentinel Persistence
//!
//! Durable storage for the Sentinel SIEM: a SQL-backed
//! [`incident_store::IncidentStore`] for events and incidents, a
//! [`change_stream::ChangeStreamBridge`] that fans out incident
//! mutations, and a hash-chained [`audit::AuditLog`].

pub mod audit;
pub mod change_stream;
pub mod error;
pub mod incident_store;

pub use audit::{AuditLog, StoredAuditEntry};
pub use change_stream::{ChangeNotification, ChangeStreamBridge};
pub use error::StorageError;
pub use incident_store::{IncidentFilter, IncidentStore, Page, TransitionError};
