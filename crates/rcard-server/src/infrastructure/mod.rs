//! Infrastructure layer for rcard-server.
//!
//! Everything that touches the outside world lives here: card transports
//! (PC/SC readers, simulators, relays), the WebSocket and REST listeners, the
//! TOML config file and the demo applets.
//!
//! # What does NOT belong here?
//!
//! - Action semantics and connection pooling (the application layer)
//! - Configuration types (the domain layer)
//! - Command-line parsing (`main.rs`)

pub mod config_file;
pub mod demo;
pub mod rest_server;
pub mod transport;
pub mod ws_server;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::application::{Gateway, GatewayHooks, NoHooks};
use crate::domain::GatewayConfig;

pub use config_file::{load_config, ConfigError, GatewayFile};
pub use rest_server::{router, serve_rest};
pub use transport::DefaultTransportFactory;
pub use ws_server::{drive_session, serve_ws};

/// Builds a gateway over the system transports.
///
/// Simulated cards get the demo applets when `config.demo_applets` is set.
pub fn build_gateway(config: &GatewayConfig) -> Arc<Gateway> {
    let hooks: Arc<dyn GatewayHooks> = if config.demo_applets {
        Arc::new(demo::DemoHooks)
    } else {
        Arc::new(NoHooks)
    };
    Gateway::new(config, Arc::new(DefaultTransportFactory::system()), hooks)
}

/// Binds both listeners and serves until the gateway shuts down.
///
/// # Errors
///
/// Returns an error if either port cannot be bound or a front-end fails.
pub async fn run_gateway(config: &GatewayConfig, gateway: Arc<Gateway>) -> anyhow::Result<()> {
    let ws_listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.ws_bind_addr))?;
    let rest_listener = TcpListener::bind(config.rest_bind_addr)
        .await
        .with_context(|| format!("failed to bind REST listener on {}", config.rest_bind_addr))?;

    tokio::try_join!(
        serve_ws(ws_listener, Arc::clone(&gateway)),
        serve_rest(rest_listener, Arc::clone(&gateway), config.request_timeout),
    )?;
    info!(
        "gateway stopped ({} connections registered)",
        gateway.registry().len()
    );
    Ok(())
}
