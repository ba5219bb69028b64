//! Forwarding requests to the upstream server and relaying its responses
//!
//! Shared by the generate/chat handlers and the catch-all passthrough
//! route. Headers are copied minus hop-by-hop headers; bodies are relayed
//! as streams so long generations reach the client as they are produced.

use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, Method, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use url::Url;

use super::ProxyError;

/// Hop-by-hop headers that must not be forwarded in either direction
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "proxy-connection",
    "te",
    "upgrade",
];

fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Client request headers to send upstream.
///
/// `content-length` is dropped as well; the client recomputes it from the
/// forwarded body.
pub fn forward_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) && *name != header::CONTENT_LENGTH {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

/// Upstream response headers to send back to the client
pub fn relay_headers(headers: &HeaderMap) -> HeaderMap {
    let mut relayed = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) {
            relayed.append(name.clone(), value.clone());
        }
    }
    relayed
}

/// Send one request upstream, bounding the wait for the response head.
///
/// The timeout covers connecting and receiving status and headers only; a
/// streamed body may keep flowing for longer.
pub async fn send_upstream(
    client: &reqwest::Client,
    timeout: Duration,
    method: Method,
    url: Url,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<reqwest::Response, ProxyError> {
    tracing::debug!(%method, %url, "Forwarding to upstream");

    let request = client
        .request(method, url)
        .headers(forward_headers(headers))
        .body(body);

    match tokio::time::timeout(timeout, request.send()).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(ProxyError::from_reqwest(&e)),
        Err(_) => Err(ProxyError::Timeout(format!(
            "no response within {}s",
            timeout.as_secs()
        ))),
    }
}

/// Build a client response from an upstream status, headers and body
pub fn build_response(
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ProxyError> {
    let mut response = Response::builder()
        .status(status)
        .body(body)
        .map_err(|e| ProxyError::Internal(format!("Failed to build response: {e}")))?;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Relay an upstream response unmodified, streaming its body
pub fn relay_response(response: reqwest::Response) -> Result<Response, ProxyError> {
    let status = response.status();
    let headers = relay_headers(response.headers());
    build_response(status, headers, Body::from_stream(response.bytes_stream()))
}
