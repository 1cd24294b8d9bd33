//! Event dispatch gateway.
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                  GATEWAY                     │
//!   HTTP request     │  ┌──────────┐   match    ┌──────────────┐    │
//!   ─────────────────┼─▶│ forward  │───────────▶│ upstream     │────┼──▶ Upstream
//!                    │  │  gate    │            │ (streamed)   │    │
//!                    │  └────┬─────┘            └──────────────┘    │
//!                    │       │ no match                             │
//!                    │       ▼                                      │
//!   WebSocket        │  ┌──────────┐  events  ┌────────────┐        │
//!   ─────────────────┼─▶│  socket  │─────────▶│ dispatcher │        │
//!                    │  │ /socket  │◀─────────│ + registry │        │
//!                    │  └──────────┘  replies └─────┬──────┘        │
//!                    │                              │ &mut          │
//!                    │                       ┌──────▼──────┐        │
//!                    │                       │ connection  │        │
//!                    │                       │   state     │        │
//!                    │                       └─────────────┘        │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use event_gateway::config::{load_config, ForwardRuleConfig, GatewayConfig};
use event_gateway::lifecycle::signals::wait_for_signal;
use event_gateway::observability::{logging, metrics};
use event_gateway::{builtin_layer, Gateway};

#[derive(Parser)]
#[command(name = "event-gateway")]
#[command(about = "WebSocket event gateway with HTTP prefix forwarding", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port (overrides the config file)
    #[arg(short, long)]
    port: Option<String>,

    /// Forward a path prefix to an upstream, as PREFIX=URL (repeatable)
    #[arg(short, long, value_parser = parse_forward)]
    forward: Vec<ForwardRuleConfig>,
}

fn parse_forward(raw: &str) -> Result<ForwardRuleConfig, String> {
    let (prefix, upstream) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PREFIX=URL, got {raw:?}"))?;
    Ok(ForwardRuleConfig {
        prefix: prefix.to_string(),
        upstream: upstream.to_string(),
    })
}

const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listener.port = Some(port.into());
    }
    config.forward.rules.extend(cli.forward);
    if config.listener.port.is_none() {
        config.listener.port = Some(DEFAULT_PORT.into());
    }

    logging::init_logging(&config.observability);
    tracing::info!("event-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        host = %config.listener.host,
        socket_path = %config.transport.path,
        forward_rules = config.forward.rules.len(),
        "Configuration loaded"
    );

    let gateway = Gateway::builder(config).layer(builtin_layer()).build()?;
    tracing::info!(ports = ?gateway.ports(), "Gateway ready");

    wait_for_signal().await;
    gateway.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
