//! Multi-user relay gateway.
//!
//! One TCP port per user, each speaking SOCKS5 or an AEAD-encrypted variant,
//! plus an HTTP endpoint publishing a periodically renewed subscription
//! document per user.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                    RELAY GATEWAY                     │
//!                 │                                                      │
//!  user i client  │  ┌──────────┐   ┌───────────┐   ┌─────────┐          │
//!  ───────────────┼─▶│  proxy   │──▶│  socks /  │──▶│   net   │──────────┼──▶ target
//!  port start+i   │  │  server  │   │  crypto   │   │ dialer  │          │
//!                 │  └──────────┘   └───────────┘   └────┬────┘          │
//!                 │        ▲                             │               │
//!                 │        └──────── relay engine ◀──────┘               │
//!                 │                                                      │
//!                 │  ┌──────────────┐   ┌──────────────┐   ┌──────────┐  │
//!  subscription   │  │ subscription │──▶│ subscription │◀──│   http   │◀─┼── client
//!  source  ◀──────┼──│  scheduler   │   │    store     │   │ publish  │  │   GET /{u}/sub.yaml
//!                 │  └──────────────┘   └──────────────┘   └──────────┘  │
//!                 │                                                      │
//!                 │  config · observability · resilience · lifecycle     │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use relay_gateway::config::{loader, ProxyMode};
use relay_gateway::lifecycle::{signals, Gateway, Shutdown};
use relay_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "relay-gateway")]
#[command(about = "Per-user SOCKS5 / encrypted relay gateway with subscription publishing", long_about = None)]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of user slots.
    #[arg(short = 'n', long)]
    users: Option<usize>,

    /// First user port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Publish endpoint bind address (e.g., 0.0.0.0:8080).
    #[arg(long)]
    http: Option<String>,

    /// Host advertised in published URLs.
    #[arg(long)]
    advertise: Option<String>,

    /// Listener variant: socks5 or encrypted.
    #[arg(long)]
    mode: Option<ProxyMode>,

    /// AEAD method for encrypted mode.
    #[arg(short, long)]
    method: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = loader::read_config(cli.config.as_deref())?;
    if let Some(users) = cli.users {
        config.proxy.users = users;
    }
    if let Some(port) = cli.port {
        config.proxy.start_port = port;
    }
    if let Some(http) = cli.http {
        config.publish.bind_address = http;
    }
    if let Some(host) = cli.advertise {
        config.publish.advertise_host = host;
    }
    if let Some(mode) = cli.mode {
        config.proxy.mode = mode;
    }
    if let Some(method) = cli.method {
        config.proxy.cipher = method;
    }
    loader::validate(&config)?;

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("failed to initialize logging: {}", e);
    }

    tracing::info!("relay-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        users = config.proxy.users,
        start_port = config.proxy.start_port,
        mode = ?config.proxy.mode,
        publish = %config.publish.bind_address,
        renewal = config.renewal.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = match Gateway::bind(config).await {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };
    gateway.announce();

    let shutdown = Arc::new(Shutdown::new());
    tokio::spawn(signals::shutdown_on_signal(Arc::clone(&shutdown)));

    gateway.run(shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
