//! REST front-end.
//!
//! Stateless twin of the WebSocket protocol: every route builds one
//! [`ActionRequest`] and answers with the JSON [`ActionResponse`].  Business
//! failures are still `200 OK` with a negative `result`.
//!
//! | Route                                        | Action                   |
//! |----------------------------------------------|--------------------------|
//! | `GET /v1/ping`                               | `{"success": 1}`         |
//! | `GET/POST /v1/card`                          | JSON body or `?req=`     |
//! | `GET/POST /v1/card/{ctype}/{cidx}/{op}`      | `is_connected`, `connect`, `disconnect`, `atr` |
//! | `GET/POST /v1/card/{ctype}/{cidx}/select/{aid}` | `select`              |
//! | `GET/POST /v1/card/{ctype}/{cidx}/cmd/{cmd}` | `send`                   |
//!
//! Each request counts as a connected client while it runs.  A request that
//! outlives the deadline answers `{"result": -1, "error": "timeout"}`; the card
//! job it started still runs to completion on the worker pool.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use rcard_core::{ActionKind, ActionRequest, ActionResponse, GatewayError};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::application::{wait_for_shutdown, ActionDispatcher, Gateway};

/// Operations reachable through `/v1/card/{ctype}/{cidx}/{op}`.
const PATH_OPS: [ActionKind; 4] = [
    ActionKind::IsConnected,
    ActionKind::Connect,
    ActionKind::Disconnect,
    ActionKind::Atr,
];

#[derive(Clone)]
struct RestState {
    dispatcher: ActionDispatcher,
    request_timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct CardQuery {
    req: Option<String>,
}

/// Builds the REST router.
pub fn router(gateway: Arc<Gateway>, request_timeout: Duration) -> Router {
    let state = RestState {
        dispatcher: ActionDispatcher::new(gateway),
        request_timeout,
    };

    Router::new()
        .route("/v1/ping", get(ping_handler))
        .route("/v1/card", get(card_handler).post(card_handler))
        .route(
            "/v1/card/{ctype}/{cidx}/select/{aid}",
            get(select_handler).post(select_handler),
        )
        .route(
            "/v1/card/{ctype}/{cidx}/cmd/{cmd}",
            get(cmd_handler).post(cmd_handler),
        )
        .route(
            "/v1/card/{ctype}/{cidx}/{op}",
            get(op_handler).post(op_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the REST router on `listener` until the gateway shuts down.
pub async fn serve_rest(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    request_timeout: Duration,
) -> anyhow::Result<()> {
    let local = listener
        .local_addr()
        .context("REST listener has no local address")?;
    info!("REST front-end listening on {local}");

    let shutdown = gateway.shutdown_signal();
    axum::serve(listener, router(gateway, request_timeout))
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
        .context("REST server failed")?;
    info!("REST front-end stopped");
    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /v1/ping
async fn ping_handler() -> Json<Value> {
    Json(json!({ "success": 1 }))
}

/// GET|POST /v1/card
async fn card_handler(
    State(state): State<RestState>,
    Query(query): Query<CardQuery>,
    body: Bytes,
) -> Json<ActionResponse> {
    let body = String::from_utf8_lossy(&body);
    let text = if body.trim().is_empty() {
        query.req.unwrap_or_default()
    } else {
        body.into_owned()
    };

    let _client = state.dispatcher.gateway().clients().guard();
    Json(within_deadline(&state, state.dispatcher.handle_text(&text, None)).await)
}

/// GET|POST /v1/card/{ctype}/{cidx}/{op}
async fn op_handler(
    State(state): State<RestState>,
    Path((ctype, cidx, op)): Path<(String, String, String)>,
) -> Json<ActionResponse> {
    let kind = op
        .parse::<ActionKind>()
        .ok()
        .filter(|kind| PATH_OPS.contains(kind))
        .ok_or(GatewayError::UnknownAction(Some(op)));
    let request = kind.and_then(|kind| card_request(kind, &ctype, &cidx));
    dispatch(&state, request).await
}

/// GET|POST /v1/card/{ctype}/{cidx}/select/{aid}
async fn select_handler(
    State(state): State<RestState>,
    Path((ctype, cidx, aid)): Path<(String, String, String)>,
) -> Json<ActionResponse> {
    let request = card_request(ActionKind::Select, &ctype, &cidx).map(|mut req| {
        req.aid = Some(aid);
        req
    });
    dispatch(&state, request).await
}

/// GET|POST /v1/card/{ctype}/{cidx}/cmd/{cmd}
async fn cmd_handler(
    State(state): State<RestState>,
    Path((ctype, cidx, cmd)): Path<(String, String, String)>,
) -> Json<ActionResponse> {
    let request = card_request(ActionKind::Send, &ctype, &cidx).map(|mut req| {
        req.apdu = Some(cmd);
        req
    });
    dispatch(&state, request).await
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn card_request(kind: ActionKind, ctype: &str, cidx: &str) -> Result<ActionRequest, GatewayError> {
    let idx = cidx
        .trim()
        .parse::<i64>()
        .map_err(|_| GatewayError::Validation(format!("invalid reader index: {cidx:?}")))?;
    let mut req = ActionRequest::new(kind);
    req.target = Some(ctype.to_string());
    req.idx = Some(idx);
    Ok(req)
}

async fn dispatch(
    state: &RestState,
    request: Result<ActionRequest, GatewayError>,
) -> Json<ActionResponse> {
    let clients = state.dispatcher.gateway().clients();
    let _client = clients.guard();
    let response = match request {
        Ok(req) => within_deadline(state, state.dispatcher.handle(req, None)).await,
        Err(e) => ActionResponse::new(clients.current()).fail(&e),
    };
    Json(response)
}

async fn within_deadline<F>(state: &RestState, work: F) -> ActionResponse
where
    F: Future<Output = ActionResponse>,
{
    match tokio::time::timeout(state.request_timeout, work).await {
        Ok(response) => response,
        Err(_) => {
            warn!("REST request exceeded {:?}", state.request_timeout);
            let clients = state.dispatcher.gateway().clients().current();
            ActionResponse::new(clients).fail(&GatewayError::Timeout)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
