use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use tracing::debug;

use crate::admin::{HealthStatus, ModelUse, TrackedModels};
use crate::proxy::{AppState, ProxyError};

pub async fn health_handler() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
    })
}

pub async fn models_handler(State(state): State<Arc<AppState>>) -> Json<TrackedModels> {
    Json(TrackedModels {
        models: state.lifecycle.tracked(),
        inactivity_timeout_secs: state.lifecycle.inactivity_timeout().as_secs(),
    })
}

/// Record a use reported by a direct client
pub async fn activity_handler(
    State(state): State<Arc<AppState>>,
    Json(reported): Json<ModelUse>,
) -> Result<StatusCode, ProxyError> {
    if reported.model.is_empty() {
        return Err(ProxyError::InvalidRequest("model is required".to_string()));
    }

    debug!(model = %reported.model, "Use reported by direct client");
    state.lifecycle.record_use(&reported.model);
    Ok(StatusCode::NO_CONTENT)
}
