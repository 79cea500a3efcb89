//! Token-bucket rate limiting, keyed per connection id.
//!
//! A connection that bursts past its bucket gets the same `-32004`
//! "busy" code the Concurrency Controller uses for backpressure — from
//! the client's point of view both mean "slow down and retry", so there
//! is no value in a fourth error code.

use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use super::{Middleware, MiddlewareContext};
use crate::error::DispatchError;
use crate::protocol::RpcError;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

pub struct RateLimitMiddleware {
    limiter: KeyedLimiter,
}

impl RateLimitMiddleware {
    #[must_use]
    pub fn new(per_second: u32, burst: u32) -> Self {
        let per_second = NonZeroU32::new(per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(burst);
        Self { limiter: RateLimiter::keyed(quota) }
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    async fn before(&self, ctx: &MiddlewareContext) -> Result<(), RpcError> {
        self.limiter
            .check_key(&ctx.connection_id)
            .map_err(|_| DispatchError::Busy.into_rpc_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn ctx(connection_id: &str) -> MiddlewareContext {
        MiddlewareContext {
            connection_id: connection_id.to_string(),
            remote_addr: None,
            credential: None,
            body_len: 0,
            received_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn exhausting_the_bucket_rejects_further_calls() {
        let middleware = RateLimitMiddleware::new(1, 1);
        assert!(middleware.before(&ctx("conn-a")).await.is_ok());
        assert!(middleware.before(&ctx("conn-a")).await.is_err());
    }

    #[tokio::test]
    async fn buckets_are_independent_per_connection() {
        let middleware = RateLimitMiddleware::new(1, 1);
        assert!(middleware.before(&ctx("conn-a")).await.is_ok());
        assert!(middleware.before(&ctx("conn-b")).await.is_ok());
    }
}
