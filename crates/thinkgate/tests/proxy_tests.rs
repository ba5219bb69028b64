//! Integration tests for the HTTP proxy functionality
//!
//! Runs the full router against a wiremock upstream: reasoning-region
//! stripping in both response modes, passthrough fidelity, error relaying
//! and activity tracking.

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

use thinkgate::config::{Config, UpstreamConfig};
use thinkgate::proxy::{AppState, create_router};

// =============================================================================
// Test Fixtures
// =============================================================================

const NDJSON: &str = "application/x-ndjson";

fn config_for(server: &MockServer, show_thinking: bool) -> Config {
    let mut config = Config {
        upstream: UpstreamConfig {
            host: server.uri(),
            timeout_secs: 10,
            ..Default::default()
        },
        ..Default::default()
    };
    config.thinking.show_thinking = show_thinking;
    config
}

fn router_for(server: &MockServer, show_thinking: bool) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::from_config(&config_for(server, show_thinking)).unwrap());
    (create_router(state.clone()), state)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

fn ndjson_lines(body: &[u8]) -> Vec<Value> {
    body.split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).unwrap())
        .collect()
}

fn ndjson_body(chunks: &[Value]) -> String {
    chunks.iter().map(|c| format!("{c}\n")).collect()
}

fn generate_chunk(text: &str, done: bool) -> Value {
    json!({"model": "deepseek-r1:7b", "created_at": "2025-01-01T00:00:00Z", "response": text, "done": done})
}

fn chat_chunk(text: &str, done: bool) -> Value {
    json!({
        "model": "deepseek-r1:7b",
        "message": {"role": "assistant", "content": text},
        "done": done
    })
}

// =============================================================================
// Generate Tests
// =============================================================================

mod generate_tests {
    use super::*;

    #[tokio::test]
    async fn test_non_streaming_response_is_stripped() {
        let server = MockServer::start().await;
        let request = json!({"model": "deepseek-r1:7b", "prompt": "Capital of France?", "stream": false});

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/generate"))
            .and(matchers::body_json(&request))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "deepseek-r1:7b",
                "response": "<think>The user wants a capital.</think>\n\nParis",
                "done": true,
                "eval_count": 17
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, false);
        let (status, headers, body) = send(router, post_json("/api/generate", &request)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(headers["content-type"].to_str().unwrap().starts_with("application/json"));

        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["response"], "\n\nParis");
        assert_eq!(json["eval_count"], 17);
        assert!(json.get("thinking").is_none());
    }

    #[tokio::test]
    async fn test_non_streaming_surfaces_thinking_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generate_chunk(
                "<think>plan</think>answer",
                true,
            )))
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, true);
        let request = json!({"model": "deepseek-r1:7b", "prompt": "q", "stream": false});
        let (_, _, body) = send(router, post_json("/api/generate", &request)).await;

        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["response"], "answer");
        assert_eq!(json["thinking"], "plan");
    }

    #[tokio::test]
    async fn test_streaming_markers_split_across_chunks() {
        let server = MockServer::start().await;
        let upstream = ndjson_body(&[
            generate_chunk("Hello <th", false),
            generate_chunk("ink>secret reasoning</thi", false),
            generate_chunk("nk> world", false),
            generate_chunk("", true),
        ]);

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(upstream, NDJSON))
            .mount(&server)
            .await;

        // No stream flag: the upstream default is to stream
        let (router, _) = router_for(&server, false);
        let request = json!({"model": "deepseek-r1:7b", "prompt": "greet"});
        let (status, headers, body) = send(router, post_json("/api/generate", &request)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], NDJSON);
        assert!(headers.get("content-length").is_none());

        let lines = ndjson_lines(&body);
        let visible: String = lines
            .iter()
            .map(|l| l["response"].as_str().unwrap())
            .collect();
        assert_eq!(visible, "Hello  world");
        assert!(!String::from_utf8_lossy(&body).contains("secret"));
        assert_eq!(lines.last().unwrap()["done"], true);
    }

    #[tokio::test]
    async fn test_streaming_skips_malformed_lines() {
        let server = MockServer::start().await;
        let upstream = format!(
            "{}\n{{\"response\": broken\n{}\n",
            generate_chunk("one ", false),
            generate_chunk("two", true)
        );

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(upstream, NDJSON))
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, false);
        let request = json!({"model": "deepseek-r1:7b", "prompt": "count", "stream": true});
        let (status, _, body) = send(router, post_json("/api/generate", &request)).await;

        assert_eq!(status, StatusCode::OK);
        let lines = ndjson_lines(&body);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["response"], "one ");
        assert_eq!(lines[1]["response"], "two");
    }

    #[tokio::test]
    async fn test_unterminated_region_is_not_leaked() {
        let server = MockServer::start().await;
        let upstream = ndjson_body(&[
            generate_chunk("Visible. <think>never", false),
            generate_chunk(" closed", false),
        ]);

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(upstream, NDJSON))
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, true);
        let request = json!({"model": "deepseek-r1:7b", "prompt": "q"});
        let (_, _, body) = send(router, post_json("/api/generate", &request)).await;

        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("Visible. "));
        assert!(!text.contains("never"));
        assert!(!text.contains("closed"));
    }

    #[tokio::test]
    async fn test_other_models_are_relayed_untouched() {
        let server = MockServer::start().await;
        let upstream = ndjson_body(&[
            json!({"model": "llama3.2", "response": "<think>kept</think>", "done": false}),
            json!({"model": "llama3.2", "response": "", "done": true}),
        ]);

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(upstream.clone(), NDJSON))
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, false);
        let request = json!({"model": "llama3.2", "prompt": "q"});
        let (status, _, body) = send(router, post_json("/api/generate", &request)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, upstream.as_bytes());
    }

    #[tokio::test]
    async fn test_upstream_error_is_relayed_verbatim() {
        let server = MockServer::start().await;
        let error_body = r#"{"error":"model 'deepseek-r1:70b' not found"}"#;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(404).set_body_raw(error_body, "application/json; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, false);
        let request = json!({"model": "deepseek-r1:70b", "prompt": "q"});
        let (status, headers, body) = send(router, post_json("/api/generate", &request)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(headers["content-type"], "application/json; charset=utf-8");
        assert_eq!(body, error_body.as_bytes());
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let server = MockServer::start().await;
        let (router, _) = router_for(&server, false);

        let request = Request::builder()
            .method("POST")
            .uri("/api/generate")
            .body(Body::from("{oops"))
            .unwrap();
        let (status, _, body) = send(router, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("invalid JSON"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}

// =============================================================================
// Chat Tests
// =============================================================================

mod chat_tests {
    use super::*;

    #[tokio::test]
    async fn test_streaming_chat_is_stripped() {
        let server = MockServer::start().await;
        let upstream = ndjson_body(&[
            chat_chunk("<think>", false),
            chat_chunk("User says hi.", false),
            chat_chunk("</think>\n\n", false),
            chat_chunk("Hi there!", false),
            chat_chunk("", true),
        ]);

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(upstream, NDJSON))
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, true);
        let request = json!({
            "model": "deepseek-r1:7b",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let (status, _, body) = send(router, post_json("/api/chat", &request)).await;

        assert_eq!(status, StatusCode::OK);
        let lines = ndjson_lines(&body);
        let visible: String = lines
            .iter()
            .map(|l| l["message"]["content"].as_str().unwrap())
            .collect();
        assert_eq!(visible, "\n\nHi there!");

        let thinking: Vec<&str> = lines
            .iter()
            .filter_map(|l| l["message"]["thinking"].as_str())
            .collect();
        assert_eq!(thinking, vec!["User says hi."]);
        assert!(lines.iter().all(|l| l["message"]["role"] == "assistant"));
    }

    #[tokio::test]
    async fn test_non_streaming_chat_is_stripped() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_chunk(
                "<think>short</think>Done.",
                true,
            )))
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, false);
        let request = json!({"model": "DeepSeek-R1", "messages": [], "stream": false});
        let (_, _, body) = send(router, post_json("/api/chat", &request)).await;

        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"]["content"], "Done.");
        assert!(json["message"].get("thinking").is_none());
    }

    #[tokio::test]
    async fn test_large_chat_body_is_forwarded() {
        let server = MockServer::start().await;
        let image = "A".repeat(3 * 1024 * 1024);
        let request = json!({
            "model": "deepseek-r1:7b",
            "messages": [{"role": "user", "content": "what is this?", "images": [image]}],
            "stream": false
        });

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/chat"))
            .and(matchers::body_json(&request))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_chunk(
                "<think>pixels</think>A letter.",
                true,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, false);
        let (status, _, body) = send(router, post_json("/api/chat", &request)).await;

        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"]["content"], "A letter.");
    }

    #[tokio::test]
    async fn test_chat_without_messages_is_bad_request() {
        let server = MockServer::start().await;
        let (router, state) = router_for(&server, false);

        let (status, _, _) = send(
            router,
            post_json("/api/chat", &json!({"model": "deepseek-r1:7b", "prompt": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!state.lifecycle.is_tracked("deepseek-r1:7b"));
    }
}

// =============================================================================
// Passthrough Tests
// =============================================================================

mod passthrough_tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_get_is_byte_identical() {
        let server = MockServer::start().await;
        let upstream_body = r#"{"models":[{"name":"deepseek-r1:7b","size":4683075271}]}"#;

        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/tags"))
            .and(matchers::query_param("verbose", "true"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(upstream_body, "application/json; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, false);
        let request = Request::builder()
            .uri("/api/tags?verbose=true")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "application/json; charset=utf-8");
        assert_eq!(body, upstream_body.as_bytes());
    }

    #[tokio::test]
    async fn test_passthrough_forwards_body_and_headers() {
        let server = MockServer::start().await;
        let request_body = json!({"model": "deepseek-r1:7b"});

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/show"))
            .and(matchers::header("x-request-source", "editor"))
            .and(matchers::body_json(&request_body))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-upstream", "ollama")
                    .set_body_json(json!({"modelfile": "FROM deepseek"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, false);
        let request = Request::builder()
            .method("POST")
            .uri("/api/show")
            .header("content-type", "application/json")
            .header("x-request-source", "editor")
            .body(Body::from(request_body.to_string()))
            .unwrap();
        let (status, headers, _) = send(router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-upstream"], "ollama");
    }

    #[tokio::test]
    async fn test_passthrough_preserves_method_and_status() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("DELETE"))
            .and(matchers::path("/api/delete"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, false);
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/delete")
            .body(Body::from(r#"{"model":"ghost"}"#))
            .unwrap();
        let (status, _, body) = send(router, request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "model not found".as_bytes());
    }

    #[tokio::test]
    async fn test_other_methods_on_inference_paths_pass_through() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/generate"))
            .respond_with(ResponseTemplate::new(405).set_body_string("method not allowed"))
            .expect(1)
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, false);
        let request = Request::builder()
            .uri("/api/generate")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(router, request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, "method not allowed".as_bytes());
    }

    #[tokio::test]
    async fn test_absolute_url_path_stays_on_upstream() {
        let upstream = MockServer::start().await;
        let other = MockServer::start().await;

        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(404).set_body_string("404 page not found"))
            .expect(1)
            .mount(&upstream)
            .await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200).set_body_string("OTHER HOST"))
            .expect(0)
            .mount(&other)
            .await;

        let (router, _) = router_for(&upstream, false);
        let request = Request::builder()
            .uri(format!("/{}/secret", other.uri()))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(router, request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 page not found".as_bytes());
        assert!(other.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_root_path_passes_through() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Ollama is running"))
            .mount(&server)
            .await;

        let (router, _) = router_for(&server, false);
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, _, body) = send(router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Ollama is running".as_bytes());
    }
}

// =============================================================================
// Activity Tracking Tests
// =============================================================================

mod activity_tests {
    use super::*;

    #[tokio::test]
    async fn test_proxied_requests_record_use() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3.2", "response": "hi", "done": true
            })))
            .mount(&server)
            .await;

        let (router, state) = router_for(&server, false);
        let request = json!({"model": "llama3.2", "prompt": "hi", "stream": false});
        send(router.clone(), post_json("/api/generate", &request)).await;

        assert!(state.lifecycle.is_tracked("llama3.2"));

        let (status, _, body) = send(
            router,
            Request::builder()
                .uri("/thinkgate/models")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["models"][0]["model"], "llama3.2");
        assert_eq!(json["models"][0]["evicting"], false);
        assert_eq!(json["inactivity_timeout_secs"], 60);
    }

    #[tokio::test]
    async fn test_admin_paths_are_not_forwarded() {
        let server = MockServer::start().await;
        let (router, _) = router_for(&server, false);

        let (status, _, body) = send(
            router,
            Request::builder()
                .uri("/thinkgate/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
