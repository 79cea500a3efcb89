//! Single-shot HTTP JSON-RPC endpoint: `POST /rpc`.
//!
//! Every request opens and closes its own `Connection` with an in-flight
//! limit of one (`connection_in_flight_limit_http`) — there is nothing
//! to hold open between requests on this transport.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::connection::TransportKind;
use crate::dispatch::DispatchOutcome;
use crate::middleware::{decode_basic_password, MiddlewareContext};
use crate::protocol::{encode, encode_batch, RpcResponse};

use super::AppState;

pub async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    let (total, failed) = state.metrics.snapshot();
    let body = serde_json::json!({
        "status": if state.is_draining() { "draining" } else { "ok" },
        "connections": state.connections.connection_count().await,
        "tools": state.registry.tool_count().await,
        "requests_total": total,
        "requests_failed": failed,
    });
    (StatusCode::OK, axum::Json(body)).into_response()
}

pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if state.is_draining() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    if body.len() > state.config.max_request_bytes {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let connection = state
        .connections
        .open(TransportKind::Http, Some(remote_addr), state.config.connection_in_flight_limit_http)
        .await;

    let credential = extract_credential(&headers);
    let ctx = MiddlewareContext {
        connection_id: connection.id.clone(),
        remote_addr: Some(remote_addr),
        credential,
        body_len: body.len(),
        received_at: Instant::now(),
    };

    let result = state
        .middleware
        .wrap(&ctx, || async { Ok(state.dispatcher.handle_bytes(&connection, &body).await) })
        .await;

    state.connections.close(&connection.id).await;

    match result {
        Err(error) => json_response(encode(&RpcResponse::failure(None, error))),
        Ok(DispatchOutcome::NoReply) => StatusCode::NO_CONTENT.into_response(),
        Ok(DispatchOutcome::Single(response)) => json_response(encode(&response)),
        Ok(DispatchOutcome::Batch(responses)) => json_response(encode_batch(&responses)),
    }
}

fn json_response(bytes: Vec<u8>) -> Response {
    (StatusCode::OK, [(axum::http::header::CONTENT_TYPE, "application/json")], bytes).into_response()
}

/// A presented credential, bearer token or HTTP basic password, for the
/// auth middleware to check. Deployments that front this server with a
/// `user:password` pair instead of a bearer token still work.
fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .or_else(|| decode_basic_password(value))
}
