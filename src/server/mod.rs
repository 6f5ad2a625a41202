//! HTTP transport for the vault.
//!
//! Thin handlers around [`VaultStore`]: every store call runs on the
//! blocking thread pool, so requests proceed in parallel.

use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

pub mod api;
mod config;
mod error;
mod handlers;
mod health;

pub use config::Config;
pub use error::{status_for, ApiError};

use crate::store::VaultStore;

const STATUS_PREFIX: &str = "/_status";

/// Upload size limit (500 MB).
const BODY_LIMIT: usize = 500 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    vault: Arc<VaultStore>,
}

impl AppState {
    pub fn new(vault: VaultStore) -> Self {
        Self {
            vault: Arc::new(vault),
        }
    }

    pub fn vault(&self) -> &VaultStore {
        &self.vault
    }

    /// Run a store operation on the blocking thread pool.
    pub async fn blocking<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&VaultStore) -> crate::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let vault = Arc::clone(&self.vault);
        let result = tokio::task::spawn_blocking(move || op(&vault)).await?;
        Ok(result?)
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(STATUS_PREFIX, health::router(state.clone()))
        .merge(api::router(state.clone()))
        .fallback(handlers::not_found_handler)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the vault API until `shutdown` resolves.
pub async fn run<S>(config: Config, state: AppState, shutdown: S) -> Result<(), HttpServerError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let listen_addr = config.listen_addr;
    let log_level = config.log_level;
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    if !state.vault().has_key() {
        tracing::warn!("No encryption key configured; uploads and decryption will fail");
    }

    let app = router(state).layer(trace_layer);

    tracing::info!(addr = ?listen_addr, "Vault server listening");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
