//! Structured per-request logging, outermost layer of the chain so it
//! sees both the true end-to-end latency and whatever a downstream layer
//! decided (auth rejection, rate limit, etc.).

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Middleware, MiddlewareContext, MiddlewareOutcome};
use crate::protocol::RpcError;

pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn before(&self, ctx: &MiddlewareContext) -> Result<(), RpcError> {
        info!(connection_id = %ctx.connection_id, remote_addr = ?ctx.remote_addr, body_len = ctx.body_len, "request accepted");
        Ok(())
    }

    async fn after(&self, ctx: &MiddlewareContext, outcome: &MiddlewareOutcome) {
        let elapsed = ctx.received_at.elapsed();
        if outcome.success {
            info!(connection_id = %ctx.connection_id, elapsed_ms = elapsed.as_millis() as u64, "request completed");
        } else {
            warn!(connection_id = %ctx.connection_id, elapsed_ms = elapsed.as_millis() as u64, "request failed");
        }
    }
}
