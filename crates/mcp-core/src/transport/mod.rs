//! Transport layer: one axum `Router` serving HTTP, WebSocket, and
//! legacy SSE+POST on a single bound address, all funneling into the
//! same `Dispatcher`.

pub mod http;
pub mod sse;
pub mod ws;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{wire, Config};
use crate::connection::ConnectionRegistry;
use crate::dispatch::Dispatcher;
use crate::events::EventBus;
use crate::middleware::{Metrics, MiddlewareChain};
use crate::registry::ToolRegistry;

/// Shared state reachable from every axum handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ToolRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub events: Arc<EventBus>,
    pub middleware: MiddlewareChain,
    pub metrics: Arc<Metrics>,
    /// Flipped once shutdown begins; new requests get 503 instead of
    /// being accepted only to be cancelled immediately after.
    pub draining: AtomicBool,
}

impl AppState {
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    pub fn begin_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    // The legacy client reads the session id back off the response to
    // correlate `/sse` with `/messages`; browsers hide response headers
    // from cross-origin scripts unless they're explicitly exposed.
    let session_header = HeaderName::from_bytes(wire::SESSION_HEADER.as_bytes())
        .expect("SESSION_HEADER is a valid header name");

    let cors = if state.config.cors_allow_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([session_header])
    } else {
        let origins: Vec<_> = state
            .config
            .cors_allow_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([session_header])
    };

    Router::new()
        .route(&state.config.rpc_path.clone(), post(http::handle_rpc))
        .route(&state.config.ws_path.clone(), get(ws::handle_upgrade))
        .route(&state.config.sse_path.clone(), get(sse::handle_stream))
        .route(&state.config.messages_path.clone(), post(sse::handle_message))
        .route(&state.config.health_path.clone(), get(http::handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
