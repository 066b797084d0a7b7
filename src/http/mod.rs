//! REST surface over the configured storage services.
//!
//! Every storage request lands on one handler that resolves the verb and
//! the resource depth (service root, container, folder, file) and runs one
//! pass through the dispatch table in [`handlers`]. Nothing is kept
//! between requests.
//!
//! Routes:
//! - `GET /health`
//! - `GET /metrics` (when a Prometheus recorder is installed)
//! - `GET /api/v2` - configured services
//! - `ANY /api/v2/{service}[/{container}[/{folder-path}/[{file}]]]`

pub mod handlers;
pub mod metrics;
pub mod types;
mod upload;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{Config, ServerConfig};
use crate::error::{ErrorBody, StorageError};
use crate::storage::build_registry;
use crate::vfs::StorageService;

pub use upload::is_http_host_allowed;

/// Shared, immutable state handed to every request.
pub struct AppState {
    pub services: HashMap<String, StorageService>,
    pub server: ServerConfig,
    pub http_client: reqwest::Client,
    pub metrics: Option<PrometheusHandle>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(services: HashMap<String, StorageService>, server: ServerConfig) -> Self {
        Self {
            services,
            server,
            http_client: reqwest::Client::new(),
            metrics: None,
        }
    }

    /// Attaches a Prometheus handle so `/metrics` can render it.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub(crate) fn service(&self, name: &str) -> Result<&StorageService, AppError> {
        self.services
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("service '{name}' is not configured")))
    }
}

/// Errors a handler can return.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    MethodNotAllowed(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Storage(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            Self::Storage(e) => e.to_body(),
            other => ErrorBody {
                message: other.to_string(),
                code: other.status().as_u16(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }
        let body = serde_json::json!({ "error": self.body() });
        (status, Json(body)).into_response()
    }
}

/// Builds the router for the given state.
pub fn router(state: SharedState) -> Router {
    let body_limit = state.server.max_upload_bytes;
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(render_metrics))
        .route("/api/v2", get(handlers::list_services))
        .route("/api/v2/{service}", any(handlers::service_root))
        .route("/api/v2/{service}/", any(handlers::service_root))
        .route("/api/v2/{service}/{*path}", any(handlers::service_path))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn render_metrics(State(state): State<SharedState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Builds every configured service.
pub fn build_services(config: &Config) -> Result<HashMap<String, StorageService>> {
    Ok(build_registry(config)?
        .into_iter()
        .map(|(name, backend)| (name, StorageService::new(backend)))
        .collect())
}

/// Runs the HTTP server until Ctrl-C.
pub async fn serve(config: &Config) -> Result<()> {
    let services = build_services(config)?;
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let state = Arc::new(AppState::new(services, config.server.clone()).with_metrics(handle));
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, services = state.services.len(), "blobgate listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")
}
