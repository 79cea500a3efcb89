//! Pluggable authentication. Disabled by default; a deployment
//! either implements `Authenticator` against its own identity provider
//! or drops in the bundled `StaticTokenAuthenticator` for a single
//! shared secret.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::{Middleware, MiddlewareContext};
use crate::error::DispatchError;
use crate::protocol::RpcError;

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credential: Option<&str>) -> bool;
}

/// Compares a presented token against one shared secret in constant
/// time, so a timing side channel can't be used to guess it byte by
/// byte.
pub struct StaticTokenAuthenticator {
    expected_hash: [u8; 32],
}

impl StaticTokenAuthenticator {
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self { expected_hash: hash(token) }
    }
}

fn hash(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, credential: Option<&str>) -> bool {
        let Some(credential) = credential else { return false };
        hash(credential).ct_eq(&self.expected_hash).into()
    }
}

/// Decodes an HTTP `Authorization: Basic <base64>` value down to the
/// password half, for deployments that front this server with a
/// user:password pair instead of a bearer token.
#[must_use]
pub fn decode_basic_password(header_value: &str) -> Option<String> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    text.split_once(':').map(|(_, password)| password.to_string())
}

pub struct AuthMiddleware {
    authenticator: Arc<dyn Authenticator>,
}

impl AuthMiddleware {
    #[must_use]
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    async fn before(&self, ctx: &MiddlewareContext) -> Result<(), RpcError> {
        if self.authenticator.authenticate(ctx.credential.as_deref()).await {
            Ok(())
        } else {
            Err(DispatchError::Unauthorized.into_rpc_error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn ctx(credential: Option<&str>) -> MiddlewareContext {
        MiddlewareContext {
            connection_id: "c1".to_string(),
            remote_addr: None,
            credential: credential.map(str::to_string),
            body_len: 0,
            received_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn accepts_the_correct_token() {
        let middleware = AuthMiddleware::new(Arc::new(StaticTokenAuthenticator::new("secret")));
        assert!(middleware.before(&ctx(Some("secret"))).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_wrong_token() {
        let middleware = AuthMiddleware::new(Arc::new(StaticTokenAuthenticator::new("secret")));
        assert!(middleware.before(&ctx(Some("wrong"))).await.is_err());
    }

    #[tokio::test]
    async fn rejects_missing_credential() {
        let middleware = AuthMiddleware::new(Arc::new(StaticTokenAuthenticator::new("secret")));
        assert!(middleware.before(&ctx(None)).await.is_err());
    }

    #[test]
    fn decodes_basic_auth_password() {
        let header = format!("Basic {}", base64_encode("user:hunter2"));
        assert_eq!(decode_basic_password(&header).as_deref(), Some("hunter2"));
    }

    fn base64_encode(value: &str) -> String {
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, value.as_bytes())
    }
}
