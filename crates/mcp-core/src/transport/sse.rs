//! Legacy n8n-compatible transport: `GET /sse` + `POST /messages`.
//! Framing must match the legacy client byte for byte: an
//! `event: endpoint` announcing where to POST, periodic `event: ping`
//! keepalives, `event: message` carrying each JSON-RPC response, and a
//! final `event: close`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event as SseFrame, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt as _;

use crate::connection::{SseEvent, TransportKind};
use crate::middleware::MiddlewareContext;
use crate::protocol::RpcResponse;

use super::AppState;

pub async fn handle_stream(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
) -> Response {
    let connection = state
        .connections
        .open(TransportKind::Sse, Some(remote_addr), state.config.connection_in_flight_limit_streaming)
        .await;
    let session = state.connections.bind_session(&connection).await;

    let endpoint = format!("{}?sessionId={}", state.config.messages_path, session.id);
    let receiver = session.take_receiver().expect("a freshly bound session's receiver has not been taken yet");

    let connections = Arc::clone(&state.connections);
    let connection_id = connection.id.clone();
    let ping_interval = state.config.ping_interval;

    let body_stream = async_stream::stream! {
        yield Ok::<_, axum::Error>(SseFrame::default().event("endpoint").data(endpoint));

        let mut receiver = UnboundedReceiverStream::new(receiver);
        loop {
            tokio::select! {
                event = receiver.next() => {
                    match event {
                        Some(SseEvent::Message(value)) => {
                            yield Ok(SseFrame::default().event("message").data(value.to_string()));
                        }
                        Some(SseEvent::Ping) => {
                            yield Ok(SseFrame::default().event("ping").data("{}"));
                        }
                        Some(SseEvent::Close(reason)) => {
                            yield Ok(SseFrame::default().event("close").data(close_payload(&reason)));
                            break;
                        }
                        None => {
                            yield Ok(SseFrame::default().event("close").data(close_payload("connection closed")));
                            break;
                        }
                    }
                }
                () = tokio::time::sleep(ping_interval) => {
                    yield Ok(SseFrame::default().event("ping").data("{}"));
                }
            }
        }
        connections.close(&connection_id).await;
    };

    let mut response = Sse::new(body_stream).keep_alive(KeepAlive::default()).into_response();
    // Proxies (nginx in particular) buffer unless told otherwise, which
    // defeats the point of a streaming response; reverse proxies that
    // don't understand the header simply ignore it.
    response.headers_mut().insert("x-accel-buffering", HeaderValue::from_static("no"));
    response.headers_mut().insert(axum::http::header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

fn close_payload(reason: &str) -> String {
    serde_json::json!({ "reason": reason }).to_string()
}

#[derive(Deserialize)]
pub struct MessagesQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

pub async fn handle_message(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    Query(query): Query<MessagesQuery>,
    body: axum::body::Bytes,
) -> Response {
    if state.is_draining() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    if body.len() > state.config.max_request_bytes {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let Some(session) = state.connections.lookup_session(&query.session_id).await else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(connection) = state.connections.get(&session.connection_id).await else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(ticket) = session.reserve() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let ctx = MiddlewareContext {
        connection_id: connection.id.clone(),
        remote_addr: Some(remote_addr),
        credential: None,
        body_len: body.len(),
        received_at: Instant::now(),
    };

    let dispatcher = Arc::clone(&state.dispatcher);
    let connection_for_dispatch = Arc::clone(&connection);
    let result = state
        .middleware
        .wrap(&ctx, || async move { Ok(dispatcher.handle_bytes(&connection_for_dispatch, &body).await) })
        .await;

    let event = match result {
        Err(error) => SseEvent::Message(serde_json::to_value(RpcResponse::failure(None, error)).unwrap_or_default()),
        Ok(crate::dispatch::DispatchOutcome::NoReply) => {
            drop(ticket);
            return StatusCode::ACCEPTED.into_response();
        }
        Ok(crate::dispatch::DispatchOutcome::Single(response)) => {
            SseEvent::Message(serde_json::to_value(&response).unwrap_or_default())
        }
        Ok(crate::dispatch::DispatchOutcome::Batch(responses)) => {
            SseEvent::Message(serde_json::to_value(&responses).unwrap_or_default())
        }
    };

    let _ = ticket.send(event);
    StatusCode::ACCEPTED.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The legacy client parses raw `event:`/`data:` lines, so these pin
    /// the exact bytes each frame kind puts on the wire.
    fn wire(event_name: &str, payload: &str) -> String {
        format!("event: {event_name}\ndata: {payload}\n\n")
    }

    #[test]
    fn ping_frame_carries_an_empty_json_object() {
        insta::assert_snapshot!(wire("ping", "{}"), @r###"
        event: ping
        data: {}

        "###);
    }

    #[test]
    fn close_frame_carries_its_reason() {
        insta::assert_snapshot!(wire("close", &close_payload("client disconnected")), @r###"
        event: close
        data: {"reason":"client disconnected"}

        "###);
    }

    #[test]
    fn endpoint_frame_carries_the_messages_url() {
        insta::assert_snapshot!(wire("endpoint", "/messages?sessionId=abc123"), @r###"
        event: endpoint
        data: /messages?sessionId=abc123

        "###);
    }

    #[test]
    fn message_frame_carries_the_raw_response_json() {
        let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {}}).to_string();
        insta::assert_snapshot!(wire("message", &body), @r###"
        event: message
        data: {"jsonrpc":"2.0","id":1,"result":{}}

        "###);
    }
}
