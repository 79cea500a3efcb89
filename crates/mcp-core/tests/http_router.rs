//! Router-level integration tests, exercising the real axum `Router`
//! built by `transport::build_router` with `tower::ServiceExt::oneshot`
//! instead of a bound socket.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use mcp_core::config::Config;
use mcp_core::middleware::{LoggingMiddleware, Metrics, MetricsMiddleware, Middleware, MiddlewareChain, ValidationMiddleware};
use mcp_core::transport::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_state(config: Config) -> Arc<AppState> {
    let runtime = mcp_core::lifecycle::build(config).unwrap();
    let layers: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(LoggingMiddleware),
        Arc::new(ValidationMiddleware { max_request_bytes: runtime.config.max_request_bytes }),
        Arc::new(MetricsMiddleware::new(Arc::new(Metrics::default()))),
    ];
    Arc::new(AppState {
        config: Arc::clone(&runtime.config),
        registry: Arc::clone(&runtime.registry),
        connections: Arc::clone(&runtime.connections),
        dispatcher: Arc::clone(&runtime.dispatcher),
        events: Arc::clone(&runtime.events),
        middleware: MiddlewareChain::new(layers),
        metrics: Arc::new(Metrics::default()),
        draining: AtomicBool::new(false),
    })
}

fn addr() -> SocketAddr {
    ([127, 0, 0, 1], 0).into()
}

fn rpc_request(body: Value) -> Request<Body> {
    Request::post("/rpc")
        .header("content-type", "application/json")
        .extension(ConnectInfo(addr()))
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_ok_when_not_draining() {
    let state = test_state(Config::default());
    let router = build_router(state);

    let request = Request::get("/health").extension(ConnectInfo(addr())).body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["status"], "ok");
}

#[tokio::test]
async fn rpc_ping_returns_empty_result_with_json_content_type() {
    let state = test_state(Config::default());
    let router = build_router(state);

    let request = rpc_request(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(axum::http::header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["result"], json!({}));
}

#[tokio::test]
async fn rpc_notification_returns_no_content() {
    let state = test_state(Config::default());
    let router = build_router(state);

    let request = rpc_request(json!({"jsonrpc": "2.0", "method": "ping"}));
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn rpc_oversize_body_is_rejected_with_413() {
    let mut config = Config::default();
    config.max_request_bytes = 16;
    let state = test_state(config);
    let router = build_router(state);

    let request = rpc_request(json!({"jsonrpc": "2.0", "id": 1, "method": "ping", "params": {"padding": "x".repeat(100)}}));
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn draining_server_rejects_new_rpc_calls_with_503() {
    let state = test_state(Config::default());
    state.begin_draining();
    let router = build_router(state);

    let request = rpc_request(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn malformed_json_maps_to_parse_error_response() {
    let state = test_state(Config::default());
    let router = build_router(state);

    let request = Request::post("/rpc")
        .header("content-type", "application/json")
        .extension(ConnectInfo(addr()))
        .body(Body::from("{not json"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["error"]["code"], -32700);
}

#[tokio::test]
async fn sse_get_announces_the_endpoint_and_binds_a_session() {
    let state = test_state(Config::default());
    let router = build_router(state.clone());

    let request = Request::get("/sse").extension(ConnectInfo(addr())).body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.connections.session_count().await, 1);
    assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");
    assert_eq!(response.headers().get(axum::http::header::CONNECTION).unwrap(), "keep-alive");
}

#[tokio::test]
async fn cors_exposes_the_session_header_to_cross_origin_clients() {
    let state = test_state(Config::default());
    let router = build_router(state);

    let request = Request::post("/rpc")
        .header("content-type", "application/json")
        .header(axum::http::header::ORIGIN, "https://example.com")
        .extension(ConnectInfo(addr()))
        .body(Body::from(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let exposed = response
        .headers()
        .get(axum::http::header::ACCESS_CONTROL_EXPOSE_HEADERS)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(exposed.to_lowercase().contains("mcp-session-id"));
}

#[tokio::test]
async fn messages_post_for_unknown_session_is_404() {
    let state = test_state(Config::default());
    let router = build_router(state);

    let request = Request::post("/messages?sessionId=nonexistent")
        .header("content-type", "application/json")
        .extension(ConnectInfo(addr()))
        .body(Body::from(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
