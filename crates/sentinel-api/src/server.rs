//! Sentinel API server with graceful shutdown.

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tower_http::compression::CompressionLayer;

use crate::error::ApiError;
use crate::middleware::{
    body_limit_layer, cors_layer, request_id_middleware, security_headers_middleware,
    timeout_layer, tracing_middleware,
};
use crate::routes::api_router;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub timeout: Duration,
    /// Max ingest body size (bytes); spec.md §4.8 caps this at 1 MiB.
    pub max_body_size: usize,
    pub compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".parse().unwrap(),
            timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
            compression: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("SENTINEL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let timeout_secs: u64 = std::env::var("SENTINEL_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(30);

        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            timeout: Duration::from_secs(timeout_secs),
            ..Default::default()
        }
    }
}

pub struct SentinelServer {
    config: ServerConfig,
    app_state: AppState,
}

impl SentinelServer {
    pub fn new(config: ServerConfig, app_state: AppState) -> Self {
        Self { config, app_state }
    }

    pub fn router(&self) -> Router {
        let mut app = api_router(self.app_state.clone());

        app = app
            .layer(CompressionLayer::new())
            .layer(body_limit_layer(self.config.max_body_size))
            .layer(timeout_layer(self.config.timeout))
            .layer(cors_layer())
            .layer(middleware::from_fn(security_headers_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(middleware::from_fn(tracing_middleware));

        app
    }

    pub async fn run(self) -> Result<(), ApiError> {
        let app = self.router();
        let addr = self.config.addr;

        self.app_state
            .change_stream()
            .start(Duration::from_millis(500))
            .await;

        tracing::info!("sentinel-api listening on http://{addr}");
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::Internal(format!("bind failed: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ApiError::Internal(format!("server error: {e}")))?;

        tracing::info!("server shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, starting graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sentinel_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default_has_one_mebibyte_body_limit() {
        let config = ServerConfig::default();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.max_body_size, 1024 * 1024);
    }
}
