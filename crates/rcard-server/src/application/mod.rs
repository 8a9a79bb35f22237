//! Application layer: gateway use cases.
//!
//! Depends only on the domain layer, `rcard-core` and the seams defined here
//! ([`Transport`](transport::Transport),
//! [`SimulatorEngine`](simulator::SimulatorEngine),
//! [`GatewayHooks`](registry::GatewayHooks)).  Concrete backends and network
//! front-ends live in the infrastructure layer and are injected at startup,
//! which keeps everything here testable without readers or sockets.

pub mod client_counter;
pub mod connection;
pub mod dispatcher;
pub mod gateway;
pub mod registry;
pub mod session;
pub mod simulator;
pub mod transport;
pub mod worker_pool;

#[cfg(test)]
pub(crate) mod testing;

pub use client_counter::{ClientCounter, ClientGuard};
pub use connection::{Connection, ConnectionStats};
pub use dispatcher::ActionDispatcher;
pub use gateway::{wait_for_shutdown, Gateway, SessionTimings};
pub use registry::{ConnectionDefaults, ConnectionRegistry, GatewayHooks, NoHooks};
pub use session::{CloseReason, KeepaliveEvent, Session};
pub use simulator::{Applet, AppletImage, SharedSimulator, SimulatorEngine};
pub use transport::{Transport, TransportConfig, TransportError, TransportFactory};
pub use worker_pool::WorkerPool;
