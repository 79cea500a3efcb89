//! Lifecycle Coordinator: orders startup and shutdown so that, for
//! example, no transport can accept a connection before the Tool
//! Registry has tools in it, and no tool call is cancelled before its
//! connection has had a chance to drain.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::connection::ConnectionRegistry;
use crate::dispatch::{ConcurrencyController, Dispatcher};
use crate::events::{Event, EventBus};
use crate::registry::ToolRegistry;

/// Everything the server needs, already constructed but not yet serving
/// traffic. Built by `build`, driven by `server::run`.
pub struct Runtime {
    pub config: Arc<Config>,
    pub registry: Arc<ToolRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub events: Arc<EventBus>,
}

/// Startup order: Config -> Tracing -> ToolRegistry -> Dispatcher
/// -> Transports. Tracing is initialized by the caller (`main`) before
/// this runs, since it must be live for every subsequent log line,
/// including ones this function emits.
pub fn build(config: Config) -> Result<Runtime, crate::error::ConfigError> {
    config.validate()?;
    info!(bind_addr = %config.bind_addr, "configuration validated");

    let config = Arc::new(config);
    let registry = Arc::new(ToolRegistry::new());
    let connections = Arc::new(ConnectionRegistry::new());
    let events = Arc::new(EventBus::new(1024));
    let concurrency = Arc::new(ConcurrencyController::new(
        config.global_in_flight_limit,
        config.default_tool_in_flight_limit,
        config.queue_depth,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        concurrency,
        Arc::clone(&config),
        Arc::clone(&events),
    ));

    info!("tool registry and dispatcher ready");
    Ok(Runtime { config, registry, connections, dispatcher, events })
}

/// Ordered graceful shutdown: stop accepting new
/// connections (the caller drops the listener before calling this), tell
/// every connection it's draining, wait for in-flight work to finish or
/// the grace period to expire, then cancel whatever remains.
pub async fn shutdown(runtime: &Runtime) {
    info!("shutdown initiated, draining connections");
    runtime.events.publish(Event::ServerDraining);
    runtime.connections.drain_all(runtime.config.drain_grace_period).await;
    info!("drain complete");
}

#[must_use]
pub fn drain_timeout(config: &Config) -> Duration {
    config.drain_grace_period
}
