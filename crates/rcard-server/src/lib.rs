//! rcard-server library crate.
//!
//! The gateway process: it pools card connections keyed by card type, reader
//! index and (for simulators) session token, and exposes them to remote
//! clients over WebSocket and REST.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Clients (JSON over WebSocket / HTTP)
//!         ↕
//! [rcard-server]
//!   ├── domain/           GatewayConfig, ActionPolicy, RelayEndpoint
//!   ├── application/      Gateway, ActionDispatcher, ConnectionRegistry,
//!   │                     Connection, Session, WorkerPool, Transport trait
//!   └── infrastructure/
//!         ├── transport/  physical (PC/SC), simulated, remote relay
//!         ├── ws_server   WebSocket accept loop + session driver
//!         ├── rest_server axum router
//!         └── config_file TOML file
//!         ↕
//! Cards (reader, in-process simulator, relay)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and `rcard-core`; it never opens a
//!   socket or talks to a reader directly.
//! - `infrastructure` depends on all other layers plus tokio, tungstenite,
//!   axum and the reader driver.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: connection pooling, action dispatch, sessions.
pub mod application;

/// Infrastructure layer: transports, network front-ends, config file.
pub mod infrastructure;
