//! HTTP read path
//!
//! Small Axum server next to the bot:
//! - `GET /health`: liveness with version and uptime
//! - `GET /experts`: the cached-or-fetched dataset as JSON, 503 when the
//!   data source cannot be reached

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::dataset::{CachedDataset, DatasetCacheManager};
use crate::delivery::DATA_SOURCE_UNAVAILABLE_TEXT;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub datasets: DatasetCacheManager,
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub version: &'static str,
}

impl AppState {
    pub fn new(datasets: DatasetCacheManager) -> Self {
        Self {
            datasets,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// Timestamp (ISO 8601)
    pub timestamp: String,
}

/// Dataset response
#[derive(Debug, Serialize)]
pub struct ExpertsResponse {
    /// Snapshot fetch time, Unix milliseconds
    pub fetched_at: i64,
    pub source: String,
    pub records: usize,
    pub rows: Vec<Vec<String>>,
}

impl From<CachedDataset> for ExpertsResponse {
    fn from(dataset: CachedDataset) -> Self {
        Self {
            fetched_at: dataset.timestamp,
            records: dataset.record_count(),
            source: dataset.source,
            rows: dataset.data,
        }
    }
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version,
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn list_experts(State(state): State<Arc<AppState>>) -> Response {
    match state.datasets.get_dataset().await {
        Ok(dataset) => Json(ExpertsResponse::from(dataset)).into_response(),
        Err(e) => {
            error!("Read path failed: {}", e.detail());
            (StatusCode::SERVICE_UNAVAILABLE, DATA_SOURCE_UNAVAILABLE_TEXT).into_response()
        }
    }
}

/// Build the router with all routes and middleware
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/experts", get(list_experts))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C / SIGTERM
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP read path listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down HTTP server"),
        _ = terminate => info!("Received SIGTERM, shutting down HTTP server"),
    }
}
