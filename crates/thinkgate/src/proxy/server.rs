//! HTTP proxy server in front of the upstream inference server
//!
//! Implements a transparent proxy that supports:
//! - Generate and chat routes with reasoning-region stripping
//! - Catch-all passthrough for every other upstream path
//! - Activity recording for idle model eviction

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, Method, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::admin;
use crate::config::Config;
use crate::error::{Result, ThinkgateError};
use crate::lifecycle::ModelLifecycleManager;
use crate::thinking::{PayloadKind, ResponseTransform, ThinkingFilter};
use crate::upstream::{OllamaClient, upstream_url};

use super::ProxyError;
use super::passthrough::{build_response, relay_headers, relay_response, send_upstream};
use super::request::InferenceRequest;
use super::streaming::{NdjsonTransformer, transform_stream};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// HTTP client for upstream requests
    pub client: reqwest::Client,
    /// Upstream base URL, always ending in `/`
    pub upstream: Url,
    /// Bound on waiting for an upstream response head
    pub request_timeout: Duration,
    /// Which models get filtered, and whether hidden text is surfaced
    pub filter: ThinkingFilter,
    /// Activity table and eviction
    pub lifecycle: Arc<ModelLifecycleManager>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let upstream = OllamaClient::new(&config.upstream)?;
        let filter = ThinkingFilter::new(&config.thinking);
        let lifecycle = Arc::new(ModelLifecycleManager::new(
            &config.lifecycle,
            Arc::new(upstream.clone()),
            filter.clone(),
        ));

        Ok(Self {
            client: upstream.http().clone(),
            upstream: upstream.base_url().clone(),
            request_timeout: config.upstream.timeout(),
            filter,
            lifecycle,
        })
    }
}

/// The main proxy server
pub struct ProxyServer {
    config: Config,
}

impl ProxyServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start the proxy server and listen for requests
    pub async fn serve(&self) -> Result<()> {
        let state = Arc::new(AppState::from_config(&self.config)?);

        let addr: SocketAddr = self
            .config
            .proxy
            .listen_addr
            .parse()
            .map_err(|e| ThinkgateError::Config(format!("Invalid listen address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ThinkgateError::Proxy(format!("Failed to bind to {addr}: {e}")))?;

        info!("Starting proxy server on {addr}");
        info!("Upstream: {}", state.upstream);
        if self.config.thinking.show_thinking {
            info!("Reasoning regions will be surfaced in the thinking field");
        }

        let sweeper = if self.config.lifecycle.enabled {
            Some(state.lifecycle.spawn_sweeper())
        } else {
            info!("Idle model eviction disabled");
            None
        };

        let app = create_router(state);
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ThinkgateError::Proxy(format!("Server error: {e}")));

        if let Some(sweeper) = sweeper {
            sweeper.shutdown().await;
        }

        served?;
        info!("Proxy server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/generate",
            post(generate_handler).fallback(passthrough_handler),
        )
        .route("/api/chat", post(chat_handler).fallback(passthrough_handler))
        .merge(admin::routes())
        .fallback(passthrough_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn generate_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    inference_handler(&state, PayloadKind::Generate, request).await
}

async fn chat_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    inference_handler(&state, PayloadKind::Chat, request).await
}

/// Buffer the whole request body with no size cap, then forward it
async fn inference_handler(state: &AppState, kind: PayloadKind, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match read_body(body).await {
        Ok(body) => body,
        Err(e) => return e.into_response(),
    };

    proxy_inference(state, kind, &parts.headers, body)
        .await
        .unwrap_or_else(|e| e.into_response())
}

/// Relay any other request to the upstream unchanged
async fn passthrough_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    proxy_passthrough(&state, request)
        .await
        .unwrap_or_else(|e| e.into_response())
}

/// Forward a generate or chat request and filter the response.
///
/// Upstream error responses and responses for models outside the reasoning
/// patterns are relayed untouched.
async fn proxy_inference(
    state: &AppState,
    kind: PayloadKind,
    headers: &HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, ProxyError> {
    let request = InferenceRequest::parse(kind, &body)?;
    let request_id = Uuid::new_v4();
    let filtered = state.filter.applies_to(&request.model);

    info!(
        %request_id,
        model = %request.model,
        kind = kind.as_str(),
        stream = request.stream,
        filtered,
        "Proxying inference request"
    );

    state.lifecycle.record_use(&request.model);

    let url = upstream_url(&state.upstream, kind.endpoint(), None);
    let response = send_upstream(
        &state.client,
        state.request_timeout,
        Method::POST,
        url,
        headers,
        body,
    )
    .await?;

    let status = response.status();
    if !status.is_success() {
        warn!(%request_id, %status, "Upstream returned an error");
        return relay_response(response);
    }
    if !filtered {
        return relay_response(response);
    }

    let mut headers = relay_headers(response.headers());
    headers.remove(header::CONTENT_LENGTH);
    let transform = ResponseTransform::new(kind, &state.filter);

    if request.stream {
        let body = transform_stream(
            response.bytes_stream(),
            NdjsonTransformer::new(transform, request_id),
        );
        return build_response(status, headers, Body::from_stream(body));
    }

    let raw = response
        .bytes()
        .await
        .map_err(|e| ProxyError::from_reqwest(&e))?;
    let body = rewrite_document(transform, raw, request_id);
    build_response(status, headers, Body::from(body))
}

/// Strip a complete response document, relaying it unchanged if it does
/// not decode as JSON
fn rewrite_document(mut transform: ResponseTransform, raw: Bytes, request_id: Uuid) -> Bytes {
    let mut document: Value = match serde_json::from_slice(&raw) {
        Ok(document) => document,
        Err(e) => {
            warn!(%request_id, error = %e, "Upstream response is not JSON, relaying unchanged");
            return raw;
        }
    };

    transform.transform_document(&mut document);
    match serde_json::to_vec(&document) {
        Ok(body) => Bytes::from(body),
        Err(e) => {
            error!(%request_id, error = %e, "Failed to re-encode response");
            raw
        }
    }
}

async fn proxy_passthrough(
    state: &AppState,
    request: Request,
) -> std::result::Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();

    let url = upstream_url(&state.upstream, parts.uri.path(), parts.uri.query());
    let body = read_body(body).await?;

    debug!(method = %parts.method, path = parts.uri.path(), "Passthrough request");

    let response = send_upstream(
        &state.client,
        state.request_timeout,
        parts.method,
        url,
        &parts.headers,
        body,
    )
    .await?;
    relay_response(response)
}

async fn read_body(body: Body) -> std::result::Result<Bytes, ProxyError> {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ProxyError::InvalidRequest(format!("Failed to read request body: {e}")))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
