//! Cancellation primitives shared by the dispatcher and concurrency
//! controller.
//!
//! A `CancelToken` fires exactly once, from whichever source reaches it
//! first: client disconnect, drain timeout, per-request deadline, or an
//! explicit `notifications/cancelled`. Tools receive a clone and SHOULD
//! poll/select on it; tools that don't are abandoned after
//! `hard_kill_after`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// A single-fire cancellation signal, cheap to clone and share between
/// the `InFlightRequest` bookkeeping and the tool invocation itself.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }

    /// Fire the token. Idempotent: firing twice has the same visible
    /// effect as firing once.
    pub fn cancel(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves when the token fires. A tool loop typically does
    /// `tokio::select! { _ = token.cancelled() => ..., result = work => ... }`.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// One request the dispatcher is tracking from acceptance to completion.
pub struct InFlightRequest {
    pub request_id: String,
    pub connection_id: String,
    pub method: String,
    pub accepted_at: Instant,
    pub deadline: Instant,
    pub cancel: CancelToken,
    pub tool_name: Option<String>,
}

impl InFlightRequest {
    #[must_use]
    pub fn new(
        request_id: String,
        connection_id: String,
        method: String,
        timeout: Duration,
        tool_name: Option<String>,
    ) -> Self {
        let now = Instant::now();
        Self {
            request_id,
            connection_id,
            method,
            accepted_at: now,
            deadline: now + timeout,
            cancel: CancelToken::new(),
            tool_name,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        assert!(!token.is_cancelled());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn double_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn already_cancelled_token_resolves_immediately() {
        let token = CancelToken::new();
        token.cancel();
        let fut = token.cancelled();
        // Polling once should be enough since `is_cancelled` short-circuits.
        futures::executor::block_on(fut);
    }
}
