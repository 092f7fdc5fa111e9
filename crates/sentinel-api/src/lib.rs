//! # Sentinel API
//!
//! HTTP surface for the Sentinel SIEM: HMAC-verified event ingest,
//! incident query/transition endpoints, and a WebSocket bridge that
//! fans out incident changes to connected operators.

pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::{SentinelServer, ServerConfig};
pub use state::AppState;
