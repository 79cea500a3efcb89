//! Composable middleware chain.
//!
//! Applied once per wire message, before the Frame Codec even runs:
//! logging wraps the outside, then validation, then rate limiting, then
//! auth innermost. `before` hooks run in configured order and the first
//! rejection short-circuits the rest; `after` hooks run in reverse order
//! so each layer sees the call unwind the way it would a normal function
//! call stack.

pub mod auth;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod validation;

pub use auth::{decode_basic_password, AuthMiddleware, Authenticator, StaticTokenAuthenticator};
pub use logging::LoggingMiddleware;
pub use metrics::{Metrics, MetricsMiddleware};
pub use rate_limit::RateLimitMiddleware;
pub use validation::ValidationMiddleware;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::protocol::RpcError;

/// Everything a middleware layer might need about the wire message it's
/// wrapping. Transport-agnostic: HTTP, WS, and SSE all build one of these
/// before invoking the chain.
pub struct MiddlewareContext {
    pub connection_id: String,
    pub remote_addr: Option<SocketAddr>,
    pub credential: Option<String>,
    pub body_len: usize,
    pub received_at: Instant,
}

pub struct MiddlewareOutcome {
    pub success: bool,
}

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Run before dispatch. Returning `Err` short-circuits the chain and
    /// the remaining layers (including dispatch) never run.
    async fn before(&self, ctx: &MiddlewareContext) -> Result<(), RpcError> {
        let _ = ctx;
        Ok(())
    }

    /// Run after dispatch (or after a `before` rejection further in).
    async fn after(&self, ctx: &MiddlewareContext, outcome: &MiddlewareOutcome) {
        let _ = (ctx, outcome);
    }
}

#[derive(Clone)]
pub struct MiddlewareChain {
    layers: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    #[must_use]
    pub fn new(layers: Vec<Arc<dyn Middleware>>) -> Self {
        Self { layers: Arc::new(layers) }
    }

    pub async fn before(&self, ctx: &MiddlewareContext) -> Result<(), RpcError> {
        for layer in self.layers.iter() {
            layer.before(ctx).await?;
        }
        Ok(())
    }

    pub async fn after(&self, ctx: &MiddlewareContext, success: bool) {
        let outcome = MiddlewareOutcome { success };
        for layer in self.layers.iter().rev() {
            layer.after(ctx, &outcome).await;
        }
    }

    /// Convenience wrapper: run `before`, and if it passes, run `body`
    /// and always run `after` with the resulting success flag.
    pub async fn wrap<F, Fut, T>(&self, ctx: &MiddlewareContext, body: F) -> Result<T, RpcError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, RpcError>>,
    {
        if let Err(error) = self.before(ctx).await {
            self.after(ctx, false).await;
            return Err(error);
        }
        let result = body().await;
        self.after(ctx, result.is_ok()).await;
        result
    }
}

#[must_use]
pub fn elapsed_since(ctx: &MiddlewareContext) -> Duration {
    ctx.received_at.elapsed()
}
