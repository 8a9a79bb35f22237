//! rcard gateway: entry point.
//!
//! Exposes local readers, simulated cards and relayed remote cards to remote
//! clients over a WebSocket protocol and a REST API.
//!
//! # Usage
//!
//! ```text
//! rcard-server [OPTIONS]
//!
//! Options:
//!   --port <PORT>          WebSocket listener port [default: 9900]
//!   --web-port <PORT>      REST listener port [default: 9901]
//!   --bind <IP>            Address both listeners bind to [default: 0.0.0.0]
//!   --workers <N>          Blocking card-I/O workers [default: 5]
//!   --reader-idx <N>       Default reader index [default: 0]
//!   --allow-terminate      Honour the `shutdown` action
//!   --allow-pick-reader    Honour the request `idx` field
//!   --reader-hint <TEXT>   Prefer the reader whose name contains TEXT
//!   --relay-host <HOST>    Relay serving "remote" cards
//!   --relay-port <PORT>    Relay base port [default: 35963]
//!   --fix-ne               Force Le on commands carrying data
//!   --default-ne <BYTE>    Le forced by --fix-ne [default: 255]
//!   --no-fix-lc            Do not append Le=00 to zero-data commands
//!   --no-demo-applets      Do not install the demo applets in simulators
//!   --config <PATH>        TOML config file
//!   -v, --verbose          Debug logging unless RUST_LOG is set
//! ```
//!
//! # Precedence
//!
//! Built-in defaults, then the `--config` file, then `RCARD_*` environment
//! variables and command-line flags.
//!
//! | Variable                  | Flag                  |
//! |---------------------------|-----------------------|
//! | `RCARD_PORT`              | `--port`              |
//! | `RCARD_WEB_PORT`          | `--web-port`          |
//! | `RCARD_BIND`              | `--bind`              |
//! | `RCARD_WORKERS`           | `--workers`           |
//! | `RCARD_READER_IDX`        | `--reader-idx`        |
//! | `RCARD_ALLOW_TERMINATE`   | `--allow-terminate`   |
//! | `RCARD_ALLOW_PICK_READER` | `--allow-pick-reader` |
//! | `RCARD_READER`            | `--reader-hint`       |
//! | `RCARD_RELAY_HOST`        | `--relay-host`        |
//! | `RCARD_RELAY_PORT`        | `--relay-port`        |
//! | `RCARD_CONFIG`            | `--config`            |

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rcard_server::domain::{GatewayConfig, RelayEndpoint, DEFAULT_RELAY_PORT};
use rcard_server::infrastructure::{build_gateway, load_config, run_gateway};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote smart-card gateway.
///
/// Flags left unset keep the value from the config file, or the built-in
/// default when there is no file.
#[derive(Debug, Parser)]
#[command(
    name = "rcard-server",
    about = "WebSocket and REST gateway to physical, simulated and relayed smart cards",
    version
)]
struct Cli {
    /// WebSocket listener port.
    #[arg(long, env = "RCARD_PORT")]
    port: Option<u16>,

    /// REST listener port.
    #[arg(long, env = "RCARD_WEB_PORT")]
    web_port: Option<u16>,

    /// IP address both listeners bind to.
    #[arg(long, env = "RCARD_BIND")]
    bind: Option<IpAddr>,

    /// Number of blocking card-I/O workers.
    #[arg(long, env = "RCARD_WORKERS", value_parser = clap::value_parser!(u16).range(1..))]
    workers: Option<u16>,

    /// Reader index used when a request does not pick one.
    #[arg(long, env = "RCARD_READER_IDX")]
    reader_idx: Option<u32>,

    /// Allow clients to stop the gateway with the `shutdown` action.
    #[arg(long, env = "RCARD_ALLOW_TERMINATE")]
    allow_terminate: bool,

    /// Allow clients to choose the reader with the request `idx` field.
    #[arg(long, env = "RCARD_ALLOW_PICK_READER")]
    allow_pick_reader: bool,

    /// Prefer the physical reader whose name contains this text.
    #[arg(long, env = "RCARD_READER")]
    reader_hint: Option<String>,

    /// Host of the relay serving "remote" cards.
    #[arg(long, env = "RCARD_RELAY_HOST")]
    relay_host: Option<String>,

    /// Relay port of reader index 0.
    #[arg(long, env = "RCARD_RELAY_PORT")]
    relay_port: Option<u16>,

    /// Force Le on commands that carry data.
    #[arg(long)]
    fix_ne: bool,

    /// Le value forced by `--fix-ne`.
    #[arg(long)]
    default_ne: Option<u8>,

    /// Do not append Le=00 to commands without data.
    #[arg(long)]
    no_fix_lc: bool,

    /// Do not install the demo applets into simulated cards.
    #[arg(long)]
    no_demo_applets: bool,

    /// TOML config file.
    #[arg(long, env = "RCARD_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Layers the file (if any) and the flags over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    fn into_gateway_config(self) -> anyhow::Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => GatewayConfig::default(),
        };

        if let Some(ip) = self.bind {
            config.ws_bind_addr.set_ip(ip);
            config.rest_bind_addr.set_ip(ip);
        }
        if let Some(port) = self.port {
            config.ws_bind_addr.set_port(port);
        }
        if let Some(port) = self.web_port {
            config.rest_bind_addr.set_port(port);
        }
        if let Some(workers) = self.workers {
            config.workers = usize::from(workers);
        }
        if let Some(idx) = self.reader_idx {
            config.policy.default_reader_index = idx;
        }
        config.policy.allow_terminate |= self.allow_terminate;
        config.policy.allow_pick_reader |= self.allow_pick_reader;

        if let Some(hint) = self.reader_hint.map(|h| h.trim().to_string()) {
            config.reader_hint = (!hint.is_empty()).then_some(hint);
        }

        if let Some(host) = self.relay_host {
            let port = self
                .relay_port
                .or(config.relay.as_ref().map(|r| r.port))
                .unwrap_or(DEFAULT_RELAY_PORT);
            config.relay = Some(RelayEndpoint { host, port });
        } else if let (Some(relay), Some(port)) = (config.relay.as_mut(), self.relay_port) {
            relay.port = port;
        }

        if self.fix_ne {
            config.fixups.fix_expected_length = true;
        }
        if let Some(ne) = self.default_ne {
            config.fixups.expected_length = ne;
        }
        if self.no_fix_lc {
            config.fixups.fix_length_field = false;
        }
        if self.no_demo_applets {
            config.demo_applets = false;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed with `clap`.
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over `--verbose`.
/// 3. The [`GatewayConfig`] is assembled from defaults, file and flags.
/// 4. A Ctrl+C handler is spawned; it starts the gateway shutdown.
/// 5. Both front-ends serve until shutdown (Ctrl+C or an allowed `shutdown`
///    action).
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = cli.into_gateway_config()?;
    info!(
        "rcard gateway starting: ws={}, rest={}, workers={}, reader={}{}",
        config.ws_bind_addr,
        config.rest_bind_addr,
        config.workers,
        config.policy.default_reader_index,
        config
            .relay
            .as_ref()
            .map(|r| format!(", relay={}:{}", r.host, r.port))
            .unwrap_or_default()
    );

    let gateway = build_gateway(&config);

    let on_signal = Arc::clone(&gateway);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                on_signal.trigger_shutdown();
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_gateway(&config, gateway).await?;

    info!("rcard gateway stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
