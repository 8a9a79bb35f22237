//! WebSocket session lifecycle.
//!
//! # State machine
//!
//! ```text
//!            open()
//!   ─────────────────► Open ──── client close ─────────┐
//!                       │  ▲                            │
//!          ping tick    │  │ pong                       │
//!   (arms pong deadline)▼  │ (disarms deadline)         ▼
//!                       Open ── deadline expired ──► Closed
//!                       │                               ▲
//!                       └── server shutdown / fault ────┘
//! ```
//!
//! The timers are plain deadlines kept in [`Keepalive`]; the driver loop in
//! the infrastructure layer sleeps until [`Session::next_wakeup`] and then
//! calls [`Session::poll_keepalive`].  Entering `Closed` drops the timers and
//! decrements the connected-client counter.  The transition happens under the
//! session lock, so only one close path ever wins.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::client_counter::ClientCounter;
use super::gateway::SessionTimings;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// No pong arrived before the deadline.
    PongTimeout,
    /// The gateway is shutting down.
    ServerShutdown,
    /// The transport or a dispatch task failed.
    Fault(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ClientClosed => f.write_str("client closed"),
            CloseReason::PongTimeout => f.write_str("pong timeout"),
            CloseReason::ServerShutdown => f.write_str("server shutdown"),
            CloseReason::Fault(msg) => write!(f, "fault: {msg}"),
        }
    }
}

/// What the driver should do after a keepalive wakeup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveEvent {
    SendPing,
    Expired,
}

/// Ping schedule plus pong deadline.
#[derive(Debug, Clone)]
pub struct Keepalive {
    ping_interval: Duration,
    pong_timeout: Duration,
    next_ping: Instant,
    pong_deadline: Option<Instant>,
}

impl Keepalive {
    pub fn new(timings: SessionTimings, now: Instant) -> Self {
        Self {
            ping_interval: timings.ping_interval,
            pong_timeout: timings.pong_timeout,
            next_ping: now + timings.ping_interval,
            pong_deadline: None,
        }
    }

    /// The earliest instant something is due.
    pub fn next_wakeup(&self) -> Instant {
        match self.pong_deadline {
            Some(deadline) => deadline.min(self.next_ping),
            None => self.next_ping,
        }
    }

    pub fn pong_deadline(&self) -> Option<Instant> {
        self.pong_deadline
    }

    /// Advances the schedule to `now`.
    ///
    /// An expired deadline wins over a due ping.  A ping arms the deadline
    /// only if none is pending, so an unanswered session closes at most
    /// `ping_interval + pong_timeout` after its last pong.
    pub fn poll(&mut self, now: Instant) -> Option<KeepaliveEvent> {
        if self.pong_deadline.is_some_and(|deadline| deadline <= now) {
            return Some(KeepaliveEvent::Expired);
        }
        if self.next_ping <= now {
            self.next_ping = now + self.ping_interval;
            if self.pong_deadline.is_none() {
                self.pong_deadline = Some(now + self.pong_timeout);
            }
            return Some(KeepaliveEvent::SendPing);
        }
        None
    }

    pub fn on_pong(&mut self) {
        self.pong_deadline = None;
    }
}

enum SessionState {
    Open(Keepalive),
    Closed(CloseReason),
}

/// One WebSocket client.
pub struct Session {
    id: String,
    opened_at: Instant,
    clients: Arc<ClientCounter>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Opens a session and counts it as a connected client.
    pub fn open(clients: Arc<ClientCounter>, timings: SessionTimings) -> Arc<Self> {
        let now = Instant::now();
        let total = clients.connect();
        let session = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            opened_at: now,
            clients,
            state: Mutex::new(SessionState::Open(Keepalive::new(timings, now))),
        });
        info!("session {} opened ({total} clients)", session.id);
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock(), SessionState::Open(_))
    }

    /// When the driver must next call [`Self::poll_keepalive`]; `None` once closed.
    pub fn next_wakeup(&self) -> Option<Instant> {
        match &*self.lock() {
            SessionState::Open(keepalive) => Some(keepalive.next_wakeup()),
            SessionState::Closed(_) => None,
        }
    }

    pub fn poll_keepalive(&self, now: Instant) -> Option<KeepaliveEvent> {
        match &mut *self.lock() {
            SessionState::Open(keepalive) => keepalive.poll(now),
            SessionState::Closed(_) => None,
        }
    }

    pub fn on_pong(&self) {
        if let SessionState::Open(keepalive) = &mut *self.lock() {
            keepalive.on_pong();
            debug!("session {}: pong", self.id);
        }
    }

    /// Moves the session to `Closed`.
    ///
    /// Returns `true` for the call that performed the transition; later calls
    /// are no-ops returning `false`.
    pub fn close(&self, reason: CloseReason) -> bool {
        let mut state = self.lock();
        if let SessionState::Closed(_) = *state {
            return false;
        }
        let remaining = self.clients.disconnect();
        info!(
            "session {} closed after {} s: {reason} ({remaining} clients)",
            self.id,
            self.opened_at.elapsed().as_secs()
        );
        *state = SessionState::Closed(reason);
        true
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        match &*self.lock() {
            SessionState::Closed(reason) => Some(reason.clone()),
            SessionState::Open(_) => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // A session dropped without an explicit close still gives back its slot.
        self.close(CloseReason::ClientClosed);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
