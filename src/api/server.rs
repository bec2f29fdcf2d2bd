use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::{limit::ConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::info;

use super::handlers;
use crate::config::DEFAULT_READ_WINDOW;
use crate::monitoring::PipelineMetrics;
use crate::pipeline::Pipeline;

pub const MAX_CONCURRENCY: usize = 256;

/// Requests are all GETs; bodies are never read.
pub const MAX_BODY_SIZE: usize = 16 * 1024;

pub const CORS_MAX_AGE: Duration = Duration::from_secs(3600);

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub metrics: Option<Arc<PipelineMetrics>>,
    /// Results served by a default `GET /api/alerts`
    pub read_window: usize,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline, metrics: None, read_window: DEFAULT_READ_WINDOW }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_read_window(mut self, read_window: usize) -> Self {
        self.read_window = read_window.max(1);
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/alerts", get(handlers::recent_alerts))
        .route("/api/health", get(handlers::health_check))
        .route("/api/clusters/stats", get(handlers::cluster_stats))
        .route("/api/metrics", get(handlers::metrics))
        .with_state(Arc::new(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .max_age(CORS_MAX_AGE),
        )
        .layer(
            ServiceBuilder::new()
                .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENCY))
                .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
                .layer(TraceLayer::new_for_http()),
        )
}

/// Serve the alert API on `bind` until `shutdown` is cancelled.
pub async fn serve(bind: &str, state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(bind).await?;
    info!("🌐 Alert API listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("Alert API stopped");
    Ok(())
}
