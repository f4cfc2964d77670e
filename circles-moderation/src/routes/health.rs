use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use circles_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};

use crate::store::CircleStore;
use crate::AppState;

/// Health check that probes the storage backend.
pub async fn health_check<S: CircleStore>(State(state): State<Arc<AppState<S>>>) -> Response {
    let probe = Arc::clone(&state);
    let storage = match tokio::task::spawn_blocking(move || probe.engine.store().ping()).await {
        Ok(Ok(())) => HealthCheck {
            name: state.engine.store().backend().to_string(),
            status: HealthStatus::Healthy,
            message: None,
        },
        Ok(Err(e)) => HealthCheck {
            name: state.engine.store().backend().to_string(),
            status: HealthStatus::Unhealthy,
            message: Some(e.to_string()),
        },
        Err(e) => HealthCheck {
            name: state.engine.store().backend().to_string(),
            status: HealthStatus::Unhealthy,
            message: Some(format!("probe task failed: {e}")),
        },
    };

    let response = HealthResponse::healthy("circles-moderation", env!("CARGO_PKG_VERSION"))
        .with_checks(vec![storage]);

    let status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics<S: CircleStore>(State(state): State<Arc<AppState<S>>>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
