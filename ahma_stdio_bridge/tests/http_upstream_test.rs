//! Integration tests for HttpUpstream against a wiremock server: response
//! formats, header handling, session capture and failure mapping.

use ahma_stdio_bridge::{
    BridgeConfig, HttpUpstream, SessionContext, SessionStore, Upstream, UpstreamError,
    protocol::{JsonRpcNotification, JsonRpcRequest, ResponseEnvelope},
};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tempfile::{TempDir, tempdir};
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    _tmp: TempDir,
    context: Arc<SessionContext>,
    upstream: HttpUpstream,
}

fn harness(server: &MockServer, configure: impl FnOnce(&mut BridgeConfig)) -> Harness {
    let tmp = tempdir().unwrap();
    let mut config = BridgeConfig::new(Url::parse(&format!("{}/mcp", server.uri())).unwrap());
    config.session_file = tmp.path().join("session_id");
    configure(&mut config);
    let context = Arc::new(SessionContext::new(
        SessionStore::new(&config.session_file),
        config.session_id.clone(),
    ));
    let upstream = HttpUpstream::new(&config, context.clone()).unwrap();
    Harness {
        _tmp: tmp,
        context,
        upstream,
    }
}

#[tokio::test]
async fn json_response_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("accept", "application/json, text/event-stream"))
        .and(header("mcp-protocol-version", "2025-03-26"))
        .and(body_partial_json(json!({"jsonrpc": "2.0", "method": "tools/list"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": {"tools": [{"name": "echo"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, |_| {});
    let reply = h
        .upstream
        .send(&JsonRpcRequest::new("tools/list", json!({})))
        .await
        .unwrap();

    assert_eq!(
        reply,
        ResponseEnvelope::Result(json!({"tools": [{"name": "echo"}]}))
    );
}

#[tokio::test]
async fn event_stream_response_yields_first_answer() {
    let server = MockServer::start().await;
    let body = concat!(
        ": keep-alive\n\n",
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n\n",
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"id\":\"1\",\n",
        "data: \"result\":{\"content\":[{\"type\":\"text\",\"text\":\"hi\"}]}}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let h = harness(&server, |_| {});
    let reply = h
        .upstream
        .send(&JsonRpcRequest::new("tools/call", json!({"name": "echo"})))
        .await
        .unwrap();

    assert_eq!(
        reply,
        ResponseEnvelope::Result(json!({"content": [{"type": "text", "text": "hi"}]}))
    );
}

#[tokio::test]
async fn session_header_is_captured_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", "abc123")
                .set_body_json(json!({"jsonrpc": "2.0", "id": "1", "result": {}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "notifications/initialized"})))
        .and(header("mcp-session-id", "abc123"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, |_| {});
    h.upstream
        .send(&JsonRpcRequest::new("initialize", json!({})))
        .await
        .unwrap();
    assert_eq!(h.context.token().as_deref(), Some("abc123"));

    h.upstream
        .notify(&JsonRpcNotification::new("notifications/initialized"))
        .await
        .unwrap();

    let persisted = std::fs::read_to_string(h.context.store().path()).unwrap();
    assert_eq!(persisted.trim(), "abc123");
}

#[tokio::test]
async fn session_header_is_captured_from_error_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(500)
                .insert_header("mcp-session-id", "rotated")
                .set_body_string("boom"),
        )
        .mount(&server)
        .await;

    let h = harness(&server, |_| {});
    let err = h
        .upstream
        .send(&JsonRpcRequest::new("tools/list", json!({})))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        UpstreamError::HttpStatus {
            status: 500,
            error: None,
            body: "boom".to_string(),
        }
    );
    assert_eq!(h.context.token().as_deref(), Some("rotated"));
}

#[tokio::test]
async fn session_header_is_captured_from_json_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", "renewed")
                .set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": "1",
                    "error": {"code": -32602, "message": "Unknown tool"}
                })),
        )
        .mount(&server)
        .await;

    let h = harness(&server, |config| config.session_id = Some("old".to_string()));
    let reply = h
        .upstream
        .send(&JsonRpcRequest::new("tools/call", json!({"name": "nope"})))
        .await
        .unwrap();

    assert!(matches!(reply, ResponseEnvelope::Error(ref e) if e.code == -32602));
    assert_eq!(h.context.token().as_deref(), Some("renewed"));
    let persisted = std::fs::read_to_string(h.context.store().path()).unwrap();
    assert_eq!(persisted.trim(), "renewed");
}

#[tokio::test]
async fn session_header_is_captured_from_event_stream() {
    let server = MockServer::start().await;
    let body = "data: {\"jsonrpc\":\"2.0\",\"id\":\"1\",\"result\":{}}\n\n";
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", "streamed")
                .set_body_raw(body, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let h = harness(&server, |_| {});
    let reply = h
        .upstream
        .send(&JsonRpcRequest::new("initialize", json!({})))
        .await
        .unwrap();

    assert_eq!(reply, ResponseEnvelope::Result(json!({})));
    assert_eq!(h.context.token().as_deref(), Some("streamed"));
    let persisted = std::fs::read_to_string(h.context.store().path()).unwrap();
    assert_eq!(persisted.trim(), "streamed");
}

#[tokio::test]
async fn authorization_and_session_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer secret"))
        .and(header("mcp-session-id", "fixed-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": "1", "result": {"ok": true}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, |config| {
        config.authorization = Some("Bearer secret".to_string());
        config.session_id = Some("fixed-1".to_string());
    });
    let reply = h
        .upstream
        .send(&JsonRpcRequest::new("ping", json!({})))
        .await
        .unwrap();

    assert_eq!(reply, ResponseEnvelope::Result(json!({"ok": true})));
}

#[tokio::test]
async fn structured_error_body_is_kept_on_http_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32001, "message": "Session not found"}
        })))
        .mount(&server)
        .await;

    let h = harness(&server, |_| {});
    let err = h
        .upstream
        .send(&JsonRpcRequest::new("tools/list", json!({})))
        .await
        .unwrap_err();

    let rpc = err.rpc_error().expect("structured error");
    assert_eq!(rpc.code, -32001);
    assert_eq!(
        ahma_stdio_bridge::classify(&err),
        ahma_stdio_bridge::ErrorClass::Session
    );
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_json(json!({"jsonrpc": "2.0", "id": "1", "result": {}})),
        )
        .mount(&server)
        .await;

    let h = harness(&server, |config| {
        config.request_timeout = Duration::from_millis(200);
    });
    let err = h
        .upstream
        .send(&JsonRpcRequest::new("tools/list", json!({})))
        .await
        .unwrap_err();

    assert_eq!(err, UpstreamError::Timeout);
}

#[tokio::test]
async fn accepted_without_body_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let h = harness(&server, |_| {});
    let err = h
        .upstream
        .send(&JsonRpcRequest::new("tools/list", json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Protocol(_)));
}

#[tokio::test]
async fn unreachable_upstream_is_a_network_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let tmp = tempdir().unwrap();
    let mut config =
        BridgeConfig::new(Url::parse(&format!("http://127.0.0.1:{port}/mcp")).unwrap());
    config.session_file = tmp.path().join("session_id");
    let context = Arc::new(SessionContext::new(
        SessionStore::new(&config.session_file),
        None,
    ));
    let upstream = HttpUpstream::new(&config, context).unwrap();

    let err = upstream
        .send(&JsonRpcRequest::new("tools/list", json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Network(_)));
}
