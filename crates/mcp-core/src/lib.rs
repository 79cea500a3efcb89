//! mcp-core
//!
//! A multi-transport JSON-RPC 2.0 dispatch core for Model Context
//! Protocol servers: decode/encode on the wire, route to registered
//! tools, and enforce concurrency, cancellation, and backpressure policy
//! uniformly across HTTP, WebSocket, and legacy SSE transports.
//!
//! # Example
//!
//! ```no_run
//! use mcp_core::{Config, McpServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let server = McpServer::build(config, vec![Arc::new(mcp_core::tools::demo::EchoToolModule)]).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod middleware;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{ConfigError, DispatchError};
pub use server::McpServer;
