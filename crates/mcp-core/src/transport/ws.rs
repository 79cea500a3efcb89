//! Bidirectional WebSocket transport: `GET /ws`.
//!
//! One `Connection` per socket, alive for as long as the socket is; the
//! connection's in-flight limit is the streaming one
//! (`connection_in_flight_limit_streaming`) since multiple requests can
//! genuinely be outstanding at once. A ping is sent every
//! `ping_interval`; a client that never responds is closed with 1011
//! once its silence exceeds twice that interval.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::connection::TransportKind;
use crate::dispatch::DispatchOutcome;
use crate::middleware::MiddlewareContext;
use crate::protocol::{encode, encode_batch};

use super::AppState;

const CLOSE_OVERSIZE: u16 = 1009;
const CLOSE_INTERNAL: u16 = 1011;

pub async fn handle_upgrade(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve(socket, state, remote_addr))
}

async fn serve(socket: WebSocket, state: Arc<AppState>, remote_addr: SocketAddr) {
    let connection = state
        .connections
        .open(TransportKind::WebSocket, Some(remote_addr), state.config.connection_in_flight_limit_streaming)
        .await;
    info!(connection_id = %connection.id, %remote_addr, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    let mut ping_interval = tokio::time::interval(state.config.ping_interval);
    ping_interval.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if connection.last_activity().await.elapsed() > state.config.ping_interval * 2 {
                    warn!(connection_id = %connection.id, "websocket unresponsive, closing");
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame { code: CLOSE_INTERNAL, reason: "ping timeout".into() })))
                        .await;
                    break;
                }
                if sink.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                let Some(incoming) = incoming else { break };
                match incoming {
                    Ok(Message::Text(text)) => {
                        if text.len() > state.config.max_request_bytes {
                            let _ = sink
                                .send(Message::Close(Some(CloseFrame { code: CLOSE_OVERSIZE, reason: "request too large".into() })))
                                .await;
                            break;
                        }
                        connection.touch().await;
                        if !handle_message(&state, &connection, text.as_bytes().to_vec(), &mut sink).await {
                            break;
                        }
                    }
                    Ok(Message::Binary(bytes)) => {
                        connection.touch().await;
                        if !handle_message(&state, &connection, bytes.to_vec(), &mut sink).await {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        connection.touch().await;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Ping(payload)) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Err(error) => {
                        warn!(connection_id = %connection.id, %error, "websocket read error");
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame { code: CLOSE_INTERNAL, reason: "read error".into() })))
                            .await;
                        break;
                    }
                }
            }
        }
    }

    state.connections.close(&connection.id).await;
    info!(connection_id = %connection.id, "websocket disconnected");
}

/// Returns `false` if the socket should be closed.
async fn handle_message(
    state: &Arc<AppState>,
    connection: &Arc<crate::connection::Connection>,
    bytes: Vec<u8>,
    sink: &mut (impl futures::Sink<Message, Error = axum::Error> + Unpin),
) -> bool {
    let ctx = MiddlewareContext {
        connection_id: connection.id.clone(),
        remote_addr: connection.remote_addr,
        credential: None,
        body_len: bytes.len(),
        received_at: Instant::now(),
    };

    let dispatcher = Arc::clone(&state.dispatcher);
    let connection_for_dispatch = Arc::clone(connection);
    let result = state
        .middleware
        .wrap(&ctx, || async move { Ok(dispatcher.handle_bytes(&connection_for_dispatch, &bytes).await) })
        .await;

    let payload = match result {
        Err(error) => Some(encode(&crate::protocol::RpcResponse::failure(None, error))),
        Ok(DispatchOutcome::NoReply) => None,
        Ok(DispatchOutcome::Single(response)) => Some(encode(&response)),
        Ok(DispatchOutcome::Batch(responses)) => Some(encode_batch(&responses)),
    };

    if let Some(payload) = payload {
        let text = String::from_utf8(payload).expect("encode() always produces valid UTF-8 JSON");
        if sink.send(Message::Text(text.into())).await.is_err() {
            return false;
        }
    }
    true
}
