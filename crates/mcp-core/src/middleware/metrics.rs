//! In-process counters, innermost-but-one layer so it only counts calls
//! that made it past rate limiting and auth. No external metrics sink is
//! wired up here; `/health` exposes a snapshot as JSON.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{Middleware, MiddlewareContext, MiddlewareOutcome};
use crate::protocol::RpcError;

#[derive(Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_failed: AtomicU64,
}

impl Metrics {
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64) {
        (self.requests_total.load(Ordering::Relaxed), self.requests_failed.load(Ordering::Relaxed))
    }
}

pub struct MetricsMiddleware {
    metrics: std::sync::Arc<Metrics>,
}

impl MetricsMiddleware {
    #[must_use]
    pub fn new(metrics: std::sync::Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    async fn after(&self, _ctx: &MiddlewareContext, outcome: &MiddlewareOutcome) {
        self.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
        if !outcome.success {
            self.metrics.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn before(&self, _ctx: &MiddlewareContext) -> Result<(), RpcError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn counts_successes_and_failures_separately() {
        let metrics = Arc::new(Metrics::default());
        let middleware = MetricsMiddleware::new(Arc::clone(&metrics));
        let ctx = MiddlewareContext {
            connection_id: "c1".to_string(),
            remote_addr: None,
            credential: None,
            body_len: 0,
            received_at: Instant::now(),
        };
        middleware.after(&ctx, &MiddlewareOutcome { success: true }).await;
        middleware.after(&ctx, &MiddlewareOutcome { success: false }).await;
        assert_eq!(metrics.snapshot(), (2, 1));
    }
}
