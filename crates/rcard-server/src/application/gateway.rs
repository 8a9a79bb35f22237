//! Process-wide gateway state.
//!
//! One [`Gateway`] is built at startup and shared (behind an `Arc`) by both
//! front-ends.  It owns the connection registry, the connected-client
//! counter, the worker pool, the client policy and the shutdown signal, so
//! nothing in the process relies on global mutable state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use super::client_counter::ClientCounter;
use super::registry::{ConnectionDefaults, ConnectionRegistry, GatewayHooks};
use super::transport::SharedTransportFactory;
use super::worker_pool::WorkerPool;
use crate::domain::{ActionPolicy, GatewayConfig};

/// Keepalive timings of WebSocket sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

/// Shared state of a running gateway.
pub struct Gateway {
    policy: ActionPolicy,
    timings: SessionTimings,
    shutdown_grace: Duration,
    registry: ConnectionRegistry,
    clients: Arc<ClientCounter>,
    workers: WorkerPool,
    shutdown_tx: watch::Sender<bool>,
}

impl Gateway {
    /// Builds the gateway from its configuration and backends.
    pub fn new(
        config: &GatewayConfig,
        factory: SharedTransportFactory,
        hooks: Arc<dyn GatewayHooks>,
    ) -> Arc<Self> {
        let defaults = ConnectionDefaults {
            fixups: config.fixups,
            reader_hint: config.reader_hint.clone(),
            relay: config.relay.clone(),
        };
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            policy: config.policy.clone(),
            timings: SessionTimings {
                ping_interval: config.ping_interval,
                pong_timeout: config.pong_timeout,
            },
            shutdown_grace: config.shutdown_grace,
            registry: ConnectionRegistry::new(factory, hooks, defaults),
            clients: Arc::new(ClientCounter::new()),
            workers: WorkerPool::new(config.workers),
            shutdown_tx,
        })
    }

    pub fn policy(&self) -> &ActionPolicy {
        &self.policy
    }

    pub fn timings(&self) -> SessionTimings {
        self.timings
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn clients(&self) -> &Arc<ClientCounter> {
        &self.clients
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// A receiver that observes `true` once shutdown starts.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Starts shutdown now.  Idempotent.
    pub fn trigger_shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("gateway shutdown started");
        }
    }

    /// Starts shutdown after the configured grace period.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule_shutdown(self: &Arc<Self>) {
        if self.is_shutting_down() {
            return;
        }
        let grace = self.shutdown_grace;
        warn!("shutdown requested, stopping in {} ms", grace.as_millis());
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            gateway.trigger_shutdown();
        });
    }
}

/// Resolves once `signal` observes `true` (or its sender is gone).
pub async fn wait_for_shutdown(mut signal: watch::Receiver<bool>) {
    // `wait_for` also returns immediately if shutdown already started.
    let _ = signal.wait_for(|stopping| *stopping).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::scripted_gateway;

    #[tokio::test]
    async fn test_trigger_shutdown_is_observed_by_late_subscribers() {
        // Arrange
        let gateway = scripted_gateway(&GatewayConfig::default());

        // Act
        gateway.trigger_shutdown();

        // Assert: a receiver created afterwards still completes.
        wait_for_shutdown(gateway.shutdown_signal()).await;
        assert!(gateway.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_shutdown_waits_for_grace_period() {
        // Arrange
        let config = GatewayConfig {
            shutdown_grace: Duration::from_secs(1),
            ..GatewayConfig::default()
        };
        let gateway = scripted_gateway(&config);

        // Act
        gateway.schedule_shutdown();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let early = gateway.is_shutting_down();
        tokio::time::sleep(Duration::from_millis(600)).await;

        // Assert
        assert!(!early);
        assert!(gateway.is_shutting_down());
    }

    #[test]
    fn test_gateway_takes_pool_size_from_config() {
        let config = GatewayConfig {
            workers: 9,
            ..GatewayConfig::default()
        };
        assert_eq!(scripted_gateway(&config).workers().size(), 9);
    }
}
