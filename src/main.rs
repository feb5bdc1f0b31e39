//! Failover gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                   FAILOVER GATEWAY                   │
//!                        │                                                      │
//!   POST /api/message    │  ┌─────────┐   ┌───────────────┐   ┌──────────────┐  │
//!   ─────────────────────┼─▶│  http   │──▶│ MessageSender │──▶│   breaker    │──┼──▶ primary broker
//!                        │  │ server  │   └───────────────┘   │ + fallback   │──┼──▶ secondary broker
//!   POST /api/blob       │  │         │   ┌───────────────┐   │              │  │
//!   ─────────────────────┼─▶│         │──▶│  BlobWriter   │──▶│              │──┼──▶ primary / secondary
//!                        │  │         │   └───────────────┘   └──────────────┘  │    storage
//!   GET /api/blob        │  │         │   ┌───────────────┐                     │
//!   ─────────────────────┼─▶│         │──▶│  BlobReader   │── primary, then ────┼──▶ secondary
//!                        │  │         │   └───────────────┘                     │
//!   GET /api/message     │  │         │   ┌───────────────┐   ┌──────────────┐  │
//!   ─────────────────────┼─▶│         │◀──│ MessageStore  │◀──│MessageReceiver│◀┼─── both brokers
//!                        │  └─────────┘   └───────────────┘   └──────────────┘  │
//!                        │                                                      │
//!                        │  config · observability · lifecycle · admin          │
//!                        └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use failover_gateway::config::loader::load_or_default;
use failover_gateway::lifecycle::startup;
use failover_gateway::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "failover-gateway", version, about = "Primary/secondary failover gateway")]
struct Args {
    /// Path to a TOML configuration file. Built-in defaults are used when absent.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_or_default(args.config.as_deref())?;

    init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        "failover-gateway starting"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
