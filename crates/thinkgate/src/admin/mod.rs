//! Status and activity endpoints
//!
//! Served under `/thinkgate/` so no upstream path is shadowed. Clients that
//! talk to the upstream directly report their model use here so the proxy's
//! sweep sees it.

pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::lifecycle::ActivitySnapshot;
use crate::proxy::AppState;

pub const HEALTH_PATH: &str = "/thinkgate/health";
pub const MODELS_PATH: &str = "/thinkgate/models";
pub const ACTIVITY_PATH: &str = "/thinkgate/activity";

/// Routes merged into the proxy router
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(HEALTH_PATH, get(handlers::health_handler))
        .route(MODELS_PATH, get(handlers::models_handler))
        .route(ACTIVITY_PATH, post(handlers::activity_handler))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
}

/// Activity table as reported by a running proxy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedModels {
    pub models: Vec<ActivitySnapshot>,
    pub inactivity_timeout_secs: u64,
}

/// A model use observed outside the proxy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelUse {
    pub model: String,
}
