use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use mcp_core::config::{wire, Config};
use mcp_core::tools::demo::EchoToolModule;
use mcp_core::McpServer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Multi-transport JSON-RPC 2.0 dispatch core for Model Context Protocol servers.
#[derive(Parser, Debug)]
#[command(name = "mcp-core", version, about)]
struct Cli {
    /// Address to bind all transports to.
    #[arg(long, env = "MCP_BIND_ADDR", default_value = "0.0.0.0:8000")]
    bind_addr: SocketAddr,

    /// Default per-request timeout, in seconds.
    #[arg(long, env = "MCP_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Global concurrent tool-call limit.
    #[arg(long, env = "MCP_GLOBAL_IN_FLIGHT_LIMIT", default_value_t = 200)]
    global_in_flight_limit: usize,

    /// Requests per second allowed per connection.
    #[arg(long, env = "MCP_RATE_LIMIT_PER_SEC", default_value_t = 20)]
    rate_limit_per_sec: u32,

    /// Burst allowance on top of the steady rate.
    #[arg(long, env = "MCP_RATE_LIMIT_BURST", default_value_t = 40)]
    rate_limit_burst: u32,

    /// Require a bearer token on every request.
    #[arg(long, env = "MCP_AUTH_ENABLED", default_value_t = false)]
    auth_enabled: bool,

    /// Shared secret checked when `--auth-enabled` is set.
    #[arg(long, env = "MCP_AUTH_TOKEN")]
    auth_token: Option<String>,

    /// Emit logs as JSON instead of human-readable text.
    #[arg(long, env = "MCP_JSON_LOGS", default_value_t = false)]
    json_logs: bool,

    /// `tracing_subscriber::EnvFilter` directive, e.g. "mcp_core=debug".
    #[arg(long, env = "MCP_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut config = Config::defaults_for(self.bind_addr);
        config.request_timeout_default = std::time::Duration::from_secs(self.request_timeout_secs);
        config.global_in_flight_limit = self.global_in_flight_limit;
        config.rate_limit_per_sec = self.rate_limit_per_sec;
        config.rate_limit_burst = self.rate_limit_burst;
        config.auth_enabled = self.auth_enabled;
        config.auth_token = self.auth_token;
        config.json_logs = self.json_logs;
        config.log_level = self.log_level;
        config
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.json_logs {
        Registry::default().with(filter).with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        Registry::default().with(filter).with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_config();
    init_tracing(&config);

    tracing::info!(
        rpc_path = wire::DEFAULT_RPC_PATH,
        ws_path = wire::DEFAULT_WS_PATH,
        sse_path = wire::DEFAULT_SSE_PATH,
        "starting mcp-core"
    );

    let server = McpServer::build(config, vec![Arc::new(EchoToolModule)]).await?;
    server.run().await?;
    Ok(())
}
