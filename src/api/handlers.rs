//! Read-only handlers for the alert dashboard

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use super::server::AppState;
use crate::pipeline::{ClassificationResult, PipelineStats};

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    /// Number of results; clamped to the configured read window
    pub limit: Option<usize>,
}

/// `GET /api/alerts`: the most recent results, oldest first.
pub async fn recent_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertQuery>,
) -> Json<Vec<ClassificationResult>> {
    let limit = query.limit.unwrap_or(state.read_window).min(state.read_window);
    Json(state.pipeline.alerts().recent(limit))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.pipeline.model_name(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn cluster_stats(State(state): State<Arc<AppState>>) -> Json<PipelineStats> {
    Json(state.pipeline.stats())
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(metrics) = &state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics disabled").into_response();
    };
    match metrics.export() {
        Ok(body) => {
            ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to export metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics export failed").into_response()
        }
    }
}
