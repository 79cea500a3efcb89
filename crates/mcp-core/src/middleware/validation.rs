//! Defense-in-depth body-size check. The transports already enforce
//! `max_request_bytes` at the framing layer (HTTP's `ContentLengthLimit`
//! / WS close-1009 / SSE POST body cap); this layer exists so the check
//! also applies uniformly to anything that calls the dispatcher directly
//! (tests, an in-process embedding) without going through a transport.

use async_trait::async_trait;

use super::{Middleware, MiddlewareContext};
use crate::error::DispatchError;
use crate::protocol::RpcError;

pub struct ValidationMiddleware {
    pub max_request_bytes: usize,
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    async fn before(&self, ctx: &MiddlewareContext) -> Result<(), RpcError> {
        if ctx.body_len > self.max_request_bytes {
            return Err(DispatchError::InvalidRequest(format!(
                "body of {} bytes exceeds the {} byte limit",
                ctx.body_len, self.max_request_bytes
            ))
            .into_rpc_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn ctx(body_len: usize) -> MiddlewareContext {
        MiddlewareContext {
            connection_id: "c1".to_string(),
            remote_addr: None,
            credential: None,
            body_len,
            received_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn rejects_oversize_body() {
        let middleware = ValidationMiddleware { max_request_bytes: 10 };
        let result = middleware.before(&ctx(11)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accepts_body_at_the_limit() {
        let middleware = ValidationMiddleware { max_request_bytes: 10 };
        assert!(middleware.before(&ctx(10)).await.is_ok());
    }
}
