//! Top-level server: binds the listener, mounts the router built in
//! `transport`, and drives graceful shutdown through the Lifecycle
//! Coordinator when the process receives `SIGINT`/`SIGTERM`.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::lifecycle::{self, Runtime};
use crate::middleware::{
    AuthMiddleware, LoggingMiddleware, Metrics, MetricsMiddleware, Middleware, MiddlewareChain,
    RateLimitMiddleware, StaticTokenAuthenticator, ValidationMiddleware,
};
use crate::registry::ToolModule;
use crate::transport::{build_router, AppState};

pub struct McpServer {
    runtime: Runtime,
    state: Arc<AppState>,
}

impl McpServer {
    /// Build the full runtime and register the given tool modules. Bound
    /// but not yet listening.
    pub async fn build(
        config: Config,
        tool_modules: Vec<Arc<dyn ToolModule>>,
    ) -> Result<Self, crate::error::ConfigError> {
        let runtime = lifecycle::build(config)?;

        for module in tool_modules {
            if let Err(error) = runtime.registry.register(module).await {
                tracing::warn!(%error, "tool registration conflict");
            }
        }

        let mut layers: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(LoggingMiddleware),
            Arc::new(ValidationMiddleware { max_request_bytes: runtime.config.max_request_bytes }),
            Arc::new(RateLimitMiddleware::new(runtime.config.rate_limit_per_sec, runtime.config.rate_limit_burst)),
        ];
        if runtime.config.auth_enabled {
            let token = runtime.config.auth_token.clone().expect("validated at startup");
            layers.push(Arc::new(AuthMiddleware::new(Arc::new(StaticTokenAuthenticator::new(&token)))));
        }
        let metrics = Arc::new(Metrics::default());
        layers.push(Arc::new(MetricsMiddleware::new(Arc::clone(&metrics))));

        let state = Arc::new(AppState {
            config: Arc::clone(&runtime.config),
            registry: Arc::clone(&runtime.registry),
            connections: Arc::clone(&runtime.connections),
            dispatcher: Arc::clone(&runtime.dispatcher),
            events: Arc::clone(&runtime.events),
            middleware: MiddlewareChain::new(layers),
            metrics,
            draining: AtomicBool::new(false),
        });

        Ok(Self { runtime, state })
    }

    /// Serve until `SIGINT`/`SIGTERM`, then drain gracefully.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.runtime.config.bind_addr).await?;
        info!(bind_addr = %self.runtime.config.bind_addr, "listening");

        let router = build_router(Arc::clone(&self.state));
        let state = Arc::clone(&self.state);
        let runtime = self.runtime;

        axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .with_graceful_shutdown(shutdown_signal(state, runtime))
            .await
    }
}

async fn shutdown_signal(state: Arc<AppState>, runtime: Runtime) {
    wait_for_signal().await;
    info!("shutdown signal received");
    state.begin_draining();
    lifecycle::shutdown(&runtime).await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
