//! JSON action protocol shared by the WebSocket and REST front-ends.
//!
//! # Message flow
//!
//! ```text
//! client ── {"action":"send","target":"sim","apdu":"00A40400..","rid":7} ──► gateway
//! client ◄── {"result":0,"num_connections":1,"rid":7,"sw":36864,..} ─────── gateway
//! ```
//!
//! Requests are decoded into [`ActionRequest`](messages::ActionRequest) and
//! the `action` tag into the closed [`ActionKind`](messages::ActionKind) enum.
//! Every response is an [`ActionResponse`](messages::ActionResponse) carrying
//! `result` (0 on success, negative on failure) and `num_connections`.

/// Error taxonomy reported to clients.
pub mod error;

/// Request/response message types.
pub mod messages;
