//! Session & Connection Registry.
//!
//! Tracks every live transport attachment, the requests in flight on it
//! (for cancellation on disconnect), and — for SSE — the session binding
//! that routes a POST's response back to the right stream.

mod session;

pub use session::{SseEvent, SseSession};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, Semaphore};

use crate::dispatch::InFlightRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    WebSocket,
    Sse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Draining,
    Closed,
}

/// One live transport attachment.
pub struct Connection {
    pub id: String,
    pub transport: TransportKind,
    pub remote_addr: Option<SocketAddr>,
    pub opened_at: Instant,
    last_activity: RwLock<Instant>,
    state: RwLock<ConnectionState>,
    pending: RwLock<HashMap<String, Arc<InFlightRequest>>>,
    /// Per-connection dispatch-slot limiter: 1 for HTTP, the
    /// configured streaming limit for WS/SSE.
    pub semaphore: Arc<Semaphore>,
    log_seq: AtomicU64,
}

impl Connection {
    #[must_use]
    pub fn new(
        id: String,
        transport: TransportKind,
        remote_addr: Option<SocketAddr>,
        in_flight_limit: usize,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            transport,
            remote_addr,
            opened_at: now,
            last_activity: RwLock::new(now),
            state: RwLock::new(ConnectionState::Open),
            pending: RwLock::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(in_flight_limit)),
            log_seq: AtomicU64::new(0),
        }
    }

    /// Next value for structured log correlation — not
    /// used for protocol behavior.
    pub fn next_log_seq(&self) -> u64 {
        self.log_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn touch(&self) {
        *self.last_activity.write().await = Instant::now();
    }

    pub async fn last_activity(&self) -> Instant {
        *self.last_activity.read().await
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn set_state(&self, new_state: ConnectionState) {
        *self.state.write().await = new_state;
    }

    pub async fn track(&self, request: Arc<InFlightRequest>) {
        self.pending.write().await.insert(request.request_id.clone(), request);
    }

    pub async fn untrack(&self, request_id: &str) {
        self.pending.write().await.remove(request_id);
    }

    /// Cancel and drop a single in-flight request by id, as triggered by
    /// an explicit `notifications/cancelled`. A no-op if the id is
    /// unknown or has already completed.
    pub async fn untrack_and_cancel(&self, request_id: &str) {
        if let Some(request) = self.pending.write().await.remove(request_id) {
            request.cancel.cancel();
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Fire every pending request's cancel token. Called on disconnect and
    /// during drain.
    pub async fn cancel_all_pending(&self) {
        let pending = self.pending.read().await;
        for req in pending.values() {
            req.cancel.cancel();
        }
    }

    /// Wait until `pending` empties or `timeout` elapses.
    pub async fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending_count().await == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Tracks every live `Connection` and every live SSE `Session`.
///
/// The only other piece of process-wide mutable state besides the Tool
/// Registry; registrations/removals are serialized, lookups are
/// concurrency-safe.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    /// session_id -> connection_id, so a session always maps to at most
    /// one open SSE connection.
    sessions: RwLock<HashMap<String, Arc<SseSession>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(
        &self,
        transport: TransportKind,
        remote_addr: Option<SocketAddr>,
        in_flight_limit: usize,
    ) -> Arc<Connection> {
        let id = uuid::Uuid::new_v4().to_string();
        let connection = Arc::new(Connection::new(id.clone(), transport, remote_addr, in_flight_limit));
        self.connections.write().await.insert(id, Arc::clone(&connection));
        connection
    }

    pub async fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(connection_id).cloned()
    }

    /// Bind a new SSE session to `connection`. A reconnect always creates
    /// a new session; any previous session bound to an old connection of
    /// the same logical client is simply superseded (the old connection's
    /// `close` is the caller's responsibility once its GET stream ends).
    pub async fn bind_session(&self, connection: &Arc<Connection>) -> Arc<SseSession> {
        let session = Arc::new(SseSession::new(connection.id.clone()));
        self.sessions.write().await.insert(session.id.clone(), Arc::clone(&session));
        session
    }

    pub async fn lookup_session(&self, session_id: &str) -> Option<Arc<SseSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Idempotent: closing an already-closed connection is a no-op.
    pub async fn close(&self, connection_id: &str) {
        let Some(connection) = self.connections.write().await.remove(connection_id) else {
            return;
        };
        connection.set_state(ConnectionState::Closed).await;
        connection.cancel_all_pending().await;
        self.sessions.write().await.retain(|_, s| s.connection_id != connection_id);
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Transition every connection to `Draining`, wait up to `timeout` for
    /// in-flight requests to empty, then force-close and cancel whatever
    /// remains.
    pub async fn drain_all(&self, timeout: Duration) {
        let connections: Vec<Arc<Connection>> = self.connections.read().await.values().cloned().collect();
        for connection in &connections {
            connection.set_state(ConnectionState::Draining).await;
        }

        let deadline = Instant::now() + timeout;
        for connection in &connections {
            let remaining = deadline.saturating_duration_since(Instant::now());
            connection.wait_drained(remaining).await;
        }

        for connection in &connections {
            connection.cancel_all_pending().await;
            connection.set_state(ConnectionState::Closed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let connection = registry.open(TransportKind::Http, None, 1).await;
        registry.close(&connection.id).await;
        registry.close(&connection.id).await;
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn session_maps_to_one_connection() {
        let registry = ConnectionRegistry::new();
        let connection = registry.open(TransportKind::Sse, None, 32).await;
        let session = registry.bind_session(&connection).await;
        let found = registry.lookup_session(&session.id).await;
        assert!(found.is_some());
        assert_eq!(found.unwrap().connection_id, connection.id);
    }

    #[tokio::test]
    async fn close_destroys_sessions_bound_to_that_connection() {
        let registry = ConnectionRegistry::new();
        let connection = registry.open(TransportKind::Sse, None, 32).await;
        let session = registry.bind_session(&connection).await;
        registry.close(&connection.id).await;
        assert!(registry.lookup_session(&session.id).await.is_none());
    }
}
