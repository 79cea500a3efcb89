//! Concurrency & Cancellation Controller.
//!
//! Three independent limits gate every tool call: global, per-tool, and
//! per-connection. Acquisition attempts all three; on any failure the
//! caller either waits on the bounded queue or is told the server is
//! busy.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::DispatchError;

/// Holds all three acquired permits for one in-flight tool call. Dropping
/// this releases the slots — callers don't need to remember to do it.
pub struct DispatchSlot {
    _global: OwnedSemaphorePermit,
    _connection: OwnedSemaphorePermit,
    _tool: OwnedSemaphorePermit,
}

struct ToolLimiter {
    semaphore: Arc<Semaphore>,
}

/// Owns the global semaphore, the per-tool semaphores (created lazily per
/// distinct tool name), and a bounded queue used when every slot is
/// momentarily exhausted.
pub struct ConcurrencyController {
    global: Arc<Semaphore>,
    per_tool: tokio::sync::Mutex<HashMap<String, ToolLimiter>>,
    default_tool_limit: usize,
    queue: Arc<Semaphore>,
}

impl ConcurrencyController {
    #[must_use]
    pub fn new(global_limit: usize, default_tool_limit: usize, queue_depth: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(global_limit)),
            per_tool: tokio::sync::Mutex::new(HashMap::new()),
            default_tool_limit,
            queue: Arc::new(Semaphore::new(queue_depth)),
        }
    }

    #[must_use]
    pub fn available_global(&self) -> usize {
        self.global.available_permits()
    }

    async fn tool_semaphore(&self, tool_name: &str) -> Arc<Semaphore> {
        let mut map = self.per_tool.lock().await;
        Arc::clone(
            &map.entry(tool_name.to_string())
                .or_insert_with(|| ToolLimiter { semaphore: Arc::new(Semaphore::new(self.default_tool_limit)) })
                .semaphore,
        )
    }

    /// Acquire a dispatch slot for `tool_name` on `connection_semaphore`
    /// (the caller's per-connection limiter). The fast path — all three
    /// slots immediately available — never touches the queue. If any
    /// slot is momentarily unavailable, the request occupies one queue
    /// slot while it waits for all three; if the queue itself is full,
    /// backpressure is returned immediately rather than waiting
    /// indefinitely.
    pub async fn acquire(
        &self,
        tool_name: &str,
        connection_semaphore: Arc<Semaphore>,
    ) -> Result<DispatchSlot, DispatchError> {
        let tool_sem = self.tool_semaphore(tool_name).await;

        if let Some(slot) = Self::try_fast_path(&self.global, &connection_semaphore, &tool_sem)? {
            return Ok(slot);
        }

        let Ok(queue_permit) = self.queue.clone().try_acquire_owned() else {
            return Err(DispatchError::Busy);
        };

        let global = Arc::clone(&self.global).acquire_owned();
        let connection = Arc::clone(&connection_semaphore).acquire_owned();
        let tool = Arc::clone(&tool_sem).acquire_owned();

        let (global, connection, tool) = tokio::join!(global, connection, tool);
        drop(queue_permit);

        let global = global.map_err(|_| DispatchError::Internal("semaphore closed".into()))?;
        let connection = connection.map_err(|_| DispatchError::Internal("semaphore closed".into()))?;
        let tool = tool.map_err(|_| DispatchError::Internal("semaphore closed".into()))?;

        Ok(DispatchSlot { _global: global, _connection: connection, _tool: tool })
    }

    /// Non-blocking attempt at all three permits at once. Returns `Ok(None)`
    /// (not an error) when any single permit isn't immediately available,
    /// so the caller falls through to the queued, waiting path instead.
    fn try_fast_path(
        global: &Arc<Semaphore>,
        connection: &Arc<Semaphore>,
        tool: &Arc<Semaphore>,
    ) -> Result<Option<DispatchSlot>, DispatchError> {
        let Ok(global_permit) = Arc::clone(global).try_acquire_owned() else {
            return Ok(None);
        };
        let Ok(connection_permit) = Arc::clone(connection).try_acquire_owned() else {
            return Ok(None);
        };
        let Ok(tool_permit) = Arc::clone(tool).try_acquire_owned() else {
            return Ok(None);
        };
        Ok(Some(DispatchSlot { _global: global_permit, _connection: connection_permit, _tool: tool_permit }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn acquires_and_releases_all_three_slots() {
        let controller = ConcurrencyController::new(2, 2, 4);
        let conn_sem = Arc::new(Semaphore::new(2));
        assert_eq!(controller.available_global(), 2);
        let slot = controller.acquire("echo", Arc::clone(&conn_sem)).await.unwrap();
        assert_eq!(controller.available_global(), 1);
        drop(slot);
        // Permit release is synchronous on drop.
        assert_eq!(controller.available_global(), 2);
    }

    #[tokio::test]
    async fn queue_full_returns_busy_immediately() {
        let controller = ConcurrencyController::new(1, 1, 0);
        let conn_sem = Arc::new(Semaphore::new(1));
        // Hold the only global slot so a second acquire has to queue.
        let _held = controller.acquire("echo", Arc::clone(&conn_sem)).await.unwrap();
        let result =
            tokio::time::timeout(Duration::from_millis(50), controller.acquire("echo", conn_sem))
                .await;
        match result {
            Ok(Err(DispatchError::Busy)) => {}
            other => panic!("expected immediate Busy, got {other:?}", other = other.is_ok()),
        }
    }

    #[tokio::test]
    async fn per_tool_limit_is_independent_per_name() {
        let controller = ConcurrencyController::new(10, 1, 4);
        let conn_sem = Arc::new(Semaphore::new(10));
        let _a = controller.acquire("echo", Arc::clone(&conn_sem)).await.unwrap();
        // A different tool name has its own limit, so this should not block.
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            controller.acquire("sleep", conn_sem),
        )
        .await;
        assert!(result.is_ok());
    }
}
