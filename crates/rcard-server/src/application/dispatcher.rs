//! Action dispatcher: one request in, one response out.
//!
//! Both front-ends hand every decoded request to [`ActionDispatcher`].  It
//! resolves the action tag and the connection key, runs the action against
//! the registry (blocking card I/O on the worker pool) and folds the outcome
//! into an [`ActionResponse`].
//!
//! # Failure model
//!
//! Nothing here panics or returns an error to the caller: every failure
//! becomes a response with a negative `result` and an `error` message, and a
//! failure on one key never affects other keys.
//!
//! ```text
//! request ──► ActionKind ──► ConnectionKey ──► registry / worker pool ──► response
//!                 │                │
//!                 └── UnknownAction└── Validation / Permission
//! ```

use std::sync::Arc;

use rcard_core::apdu::command::decode_hex;
use rcard_core::{
    ActionKind, ActionRequest, ActionResponse, CardType, CommandApdu, ConnectionKey, GatewayError,
};
use tracing::{debug, warn};

use super::gateway::Gateway;
use crate::domain::ActionPolicy;

/// Executes action requests against a [`Gateway`].
#[derive(Clone)]
pub struct ActionDispatcher {
    gateway: Arc<Gateway>,
}

impl ActionDispatcher {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Decodes one JSON frame and handles it.
    ///
    /// `session` is the WebSocket session id; REST callers pass `None`.
    pub async fn handle_text(&self, text: &str, session: Option<&str>) -> ActionResponse {
        match ActionRequest::from_json(text) {
            Ok(req) => self.handle(req, session).await,
            Err(e) => {
                warn!("undecodable request: {e}");
                self.finish(Err(e), session, None)
            }
        }
    }

    /// Handles one decoded request.
    pub async fn handle(&self, req: ActionRequest, session: Option<&str>) -> ActionResponse {
        let rid = req.rid.clone();
        let outcome = self.execute(&req).await;
        if let Err(e) = &outcome {
            debug!("action {:?} failed: {e}", req.action);
        }
        self.finish(outcome, session, rid)
    }

    fn finish(
        &self,
        outcome: Result<ActionResponse, GatewayError>,
        session: Option<&str>,
        rid: Option<serde_json::Value>,
    ) -> ActionResponse {
        let mut resp = match outcome {
            Ok(resp) => resp,
            Err(e) => ActionResponse::default().fail(&e),
        };
        resp.num_connections = self.gateway.clients().current();
        match session {
            Some(id) => resp.with_session(id, rid),
            None => resp,
        }
    }

    async fn execute(&self, req: &ActionRequest) -> Result<ActionResponse, GatewayError> {
        let kind = req.kind()?;
        debug!("action {kind} target={:?} idx={:?}", req.target, req.idx);

        match kind {
            ActionKind::Ping => Ok(ActionResponse::default()),
            ActionKind::Shutdown => self.shutdown(),
            ActionKind::Reset => {
                let key = self.resolve_key(req)?;
                let gateway = Arc::clone(&self.gateway);
                self.gateway
                    .workers()
                    .run(move || gateway.registry().reset(&key))
                    .await?;
                Ok(ActionResponse::default())
            }
            ActionKind::Disconnect => {
                let key = self.resolve_key(req)?;
                let gateway = Arc::clone(&self.gateway);
                self.gateway
                    .workers()
                    .run(move || gateway.registry().disconnect(&key))
                    .await?;
                Ok(ActionResponse::default())
            }
            ActionKind::Connect => {
                let key = self.resolve_key(req)?;
                let gateway = Arc::clone(&self.gateway);
                self.gateway
                    .workers()
                    .run(move || gateway.registry().open(&key).map(|_| ()))
                    .await??;
                Ok(ActionResponse {
                    connected: Some(true),
                    ..ActionResponse::default()
                })
            }
            ActionKind::IsConnected => {
                let key = self.resolve_key(req)?;
                let conn = self.gateway.registry().get_or_create(&key);
                Ok(ActionResponse {
                    connected: Some(conn.is_connected()),
                    ctype: Some(
                        conn.last_kind()
                            .map_or("?", CardType::as_target)
                            .to_string(),
                    ),
                    ..ActionResponse::default()
                })
            }
            ActionKind::Atr => {
                let key = self.resolve_key(req)?;
                let conn = self.gateway.registry().get_or_create(&key);
                Ok(ActionResponse {
                    atr: Some(conn.atr().map(hex::encode_upper).unwrap_or_default()),
                    ..ActionResponse::default()
                })
            }
            ActionKind::Send => {
                let key = self.resolve_key(req)?;
                let text = required(&req.apdu, "apdu")?;
                let cmd = CommandApdu::from_hex(text)?;
                self.transmit(key, cmd).await
            }
            ActionKind::Select => {
                let key = self.resolve_key(req)?;
                let aid = decode_hex(required(&req.aid, "aid")?)?;
                let cmd = CommandApdu::select(&aid)?;
                self.transmit(key, cmd).await
            }
        }
    }

    fn shutdown(&self) -> Result<ActionResponse, GatewayError> {
        if !self.gateway.policy().allow_terminate {
            return Err(GatewayError::Permission("not allowed".to_string()));
        }
        self.gateway.schedule_shutdown();
        Ok(ActionResponse::default())
    }

    async fn transmit(
        &self,
        key: ConnectionKey,
        cmd: CommandApdu,
    ) -> Result<ActionResponse, GatewayError> {
        let conn = self.gateway.registry().get_or_create(&key);
        let answer = self
            .gateway
            .workers()
            .run(move || conn.transmit(&cmd))
            .await??;
        Ok(ActionResponse::default().with_card_response(&answer))
    }

    fn resolve_key(&self, req: &ActionRequest) -> Result<ConnectionKey, GatewayError> {
        let card_type: CardType = req.target.as_deref().unwrap_or("card").parse()?;
        let index = resolve_reader_index(self.gateway.policy(), req.idx)?;
        ConnectionKey::new(card_type, index, req.csess.as_deref())
    }
}

/// Picks the reader index for a request under `policy`.
///
/// Without reader picking, a request may only name the default index.
pub fn resolve_reader_index(
    policy: &ActionPolicy,
    requested: Option<i64>,
) -> Result<u32, GatewayError> {
    let Some(idx) = requested else {
        return Ok(policy.default_reader_index);
    };
    if idx < 0 {
        return Err(GatewayError::Validation(format!(
            "reader index must not be negative: {idx}"
        )));
    }
    if !policy.allow_pick_reader && idx != i64::from(policy.default_reader_index) {
        return Err(GatewayError::Permission(
            "picking a reader is not allowed".to_string(),
        ));
    }
    u32::try_from(idx)
        .map_err(|_| GatewayError::Validation(format!("reader index out of range: {idx}")))
}

fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, GatewayError> {
    field
        .as_deref()
        .ok_or_else(|| GatewayError::Validation(format!("missing field: {name}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
