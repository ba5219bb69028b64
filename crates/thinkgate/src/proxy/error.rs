//! Errors raised by the proxy itself, as opposed to errors relayed from
//! the upstream server.
//!
//! Upstream error responses are never converted into a [`ProxyError`]; they
//! are relayed with their own status and body. Errors produced here use the
//! upstream's error shape, `{"error": "<message>"}`, so clients need a
//! single parser for both.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Errors that can occur while proxying a request
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    /// The client request failed validation
    #[error("{0}")]
    InvalidRequest(String),

    /// The upstream could not be reached or the connection broke
    #[error("Upstream unavailable: {0}")]
    Network(String),

    /// The upstream did not answer within the request timeout
    #[error("Upstream timed out: {0}")]
    Timeout(String),

    /// Failure inside the proxy
    #[error("Proxy error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Classify a transport error from the upstream client
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout(err.to_string())
        } else if err.is_connect() {
            ProxyError::Network(format!("Failed to connect to upstream: {err}"))
        } else {
            ProxyError::Network(format!("Request failed: {err}"))
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Network(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short category name for logging
    pub fn category(&self) -> &'static str {
        match self {
            ProxyError::InvalidRequest(_) => "request",
            ProxyError::Network(_) => "network",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ProxyError::InvalidRequest(_) => {
                warn!(error_type = self.category(), error_message = %self, "Rejected request")
            }
            _ => error!(error_type = self.category(), error_message = %self, "Proxy failure"),
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
