//! WebSocket front-end: accept loop and per-session driver.
//!
//! This module is responsible for:
//!
//! 1. Accepting TCP connections on the WebSocket listener.
//! 2. Upgrading each one to a WebSocket and opening a [`Session`].
//! 3. Driving the session from a single `select!` loop:
//!    - text frames are decoded and dispatched as concurrent tasks,
//!    - finished tasks are written back as text frames,
//!    - keepalive pings go out on schedule and pongs disarm the deadline,
//!    - gateway shutdown ends the session.
//! 4. Closing the session exactly once, whatever ended it.
//!
//! ```text
//!            ┌──────────── drive_session (one task per client) ─────────────┐
//!  client ──►│ inbound ──Text──► JoinSet<dispatch> ──► outbound ──Text──────►│──► client
//!            │    │ Pong                                   ▲ Ping / Close    │
//!            │    └────────► Session keepalive ────────────┘                 │
//!            └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The driver is generic over the stream and sink halves so tests can run it
//! against in-memory channels without sockets.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use rcard_core::ActionResponse;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use crate::application::{
    wait_for_shutdown, ActionDispatcher, CloseReason, Gateway, KeepaliveEvent, Session,
};

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the WebSocket accept loop until the gateway shuts down.
///
/// Each accepted connection is handed to its own Tokio task; sessions still
/// running at shutdown observe the same signal and close themselves.
pub async fn serve_ws(listener: TcpListener, gateway: Arc<Gateway>) -> anyhow::Result<()> {
    let local = listener
        .local_addr()
        .context("WebSocket listener has no local address")?;
    info!("WebSocket front-end listening on {local}");

    let dispatcher = ActionDispatcher::new(Arc::clone(&gateway));
    let shutdown = gateway.shutdown_signal();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("WebSocket connection from {peer}");
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, dispatcher).await {
                            warn!("WebSocket client {peer}: {e:#}");
                        }
                    });
                }
                // Transient (e.g. too many open files); keep accepting.
                Err(e) => error!("WebSocket accept error: {e}"),
            },
            _ = wait_for_shutdown(shutdown.clone()) => {
                info!("WebSocket front-end stopping");
                break;
            }
        }
    }
    Ok(())
}

/// Upgrades one TCP connection and drives its session to completion.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: ActionDispatcher,
) -> anyhow::Result<()> {
    let ws = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer}"))?;

    let gateway = Arc::clone(dispatcher.gateway());
    let session = Session::open(Arc::clone(gateway.clients()), gateway.timings());
    info!("session {} bound to {peer}", session.id());

    let (outbound, inbound) = ws.split();
    let reason = drive_session(
        inbound,
        outbound,
        Arc::clone(&session),
        dispatcher,
        gateway.shutdown_signal(),
    )
    .await;
    debug!("session {} with {peer} ended: {reason}", session.id());
    Ok(())
}

// ── Session driver ────────────────────────────────────────────────────────────

/// Runs `session` over the given frame stream and sink until it closes.
///
/// Returns the reason recorded on the session.  On return the session is
/// `Closed`, pending dispatch tasks are dropped (worker jobs already running
/// finish on their own and their results are discarded) and, for
/// server-initiated endings, a close frame has been sent.
pub async fn drive_session<S, K>(
    mut inbound: S,
    mut outbound: K,
    session: Arc<Session>,
    dispatcher: ActionDispatcher,
    shutdown: watch::Receiver<bool>,
) -> CloseReason
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
    K: Sink<WsMessage, Error = WsError> + Unpin,
{
    let mut tasks: JoinSet<ActionResponse> = JoinSet::new();
    let session_id = session.id().to_string();

    let reason = loop {
        let Some(wakeup) = session.next_wakeup() else {
            // Closed from elsewhere.
            break session.close_reason().unwrap_or(CloseReason::ClientClosed);
        };

        tokio::select! {
            _ = sleep_until(wakeup) => match session.poll_keepalive(Instant::now()) {
                Some(KeepaliveEvent::SendPing) => {
                    debug!("session {session_id}: ping");
                    if let Err(e) = outbound.send(WsMessage::Ping(Vec::new())).await {
                        break CloseReason::Fault(format!("ping failed: {e}"));
                    }
                }
                Some(KeepaliveEvent::Expired) => break CloseReason::PongTimeout,
                None => {}
            },

            frame = inbound.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let dispatcher = dispatcher.clone();
                    let id = session_id.clone();
                    tasks.spawn(async move { dispatcher.handle_text(&text, Some(&id)).await });
                }
                Some(Ok(WsMessage::Pong(_))) => session.on_pong(),
                Some(Ok(WsMessage::Ping(_))) => {
                    // tungstenite queued the pong; push it out.
                    if let Err(e) = outbound.flush().await {
                        break CloseReason::Fault(format!("pong flush failed: {e}"));
                    }
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    warn!("session {session_id}: binary frame of {} bytes ignored", data.len());
                }
                Some(Ok(WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(_))) | None => break CloseReason::ClientClosed,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    break CloseReason::ClientClosed
                }
                Some(Err(e)) => break CloseReason::Fault(e.to_string()),
            },

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                Ok(response) => match serde_json::to_string(&response) {
                    Ok(json) => {
                        if let Err(e) = outbound.send(WsMessage::Text(json)).await {
                            break CloseReason::Fault(format!("send failed: {e}"));
                        }
                    }
                    Err(e) => error!("session {session_id}: response serialization failed: {e}"),
                },
                Err(e) => break CloseReason::Fault(format!("dispatch task failed: {e}")),
            },

            _ = wait_for_shutdown(shutdown.clone()) => break CloseReason::ServerShutdown,
        }
    };

    tasks.abort_all();
    if let Some(frame) = close_frame(&reason) {
        if let Err(e) = outbound.send(WsMessage::Close(Some(frame))).await {
            debug!("session {session_id}: close frame not delivered: {e}");
        }
    }
    let _ = outbound.close().await;

    session.close(reason);
    session
        .close_reason()
        .unwrap_or(CloseReason::ClientClosed)
}

/// The close frame sent for server-initiated endings.
fn close_frame(reason: &CloseReason) -> Option<CloseFrame<'static>> {
    let code = match reason {
        CloseReason::PongTimeout => CloseCode::Policy,
        CloseReason::ServerShutdown => CloseCode::Away,
        CloseReason::Fault(_) => CloseCode::Error,
        CloseReason::ClientClosed => return None,
    };
    Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
