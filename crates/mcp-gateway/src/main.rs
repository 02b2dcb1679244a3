//! MCP Gateway - Entry Point
//!
//! Serves the built-in sample catalog over stdio or HTTP.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mcp_gateway::{Config, GatewayServer, catalog::builtin};

#[derive(Parser, Debug)]
#[command(name = "mcp-gateway")]
#[command(about = "MCP gateway - JSON-RPC dispatcher with SSE and WebSocket streaming")]
#[command(version)]
struct Cli {
    /// Transport mode: stdio or http
    #[arg(long, default_value = "http")]
    transport: Transport,

    /// HTTP server port (only used with --transport http)
    #[arg(long, default_value = "8000", env = "PORT")]
    port: u16,

    /// Protocol version advertised by initialize
    #[arg(long, env = "MCP_PROTOCOL_VERSION")]
    protocol_version: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Transport {
    /// Standard input/output (for desktop clients)
    Stdio,
    /// HTTP with SSE and WebSocket streaming
    #[default]
    Http,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?cli.transport,
        "Starting MCP gateway"
    );

    let config = Config::new(cli.protocol_version);
    let server = GatewayServer::new(builtin::sample_catalog(), config);

    match cli.transport {
        Transport::Stdio => server.run_stdio().await?,
        Transport::Http => server.run_http(cli.port).await?,
    }

    Ok(())
}
