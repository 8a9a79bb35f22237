//! Integration tests for the action dispatcher over the stock transports.
//!
//! # Purpose
//!
//! These tests drive [`ActionDispatcher`] through its public API with the
//! real transport factory and the demo hooks, the same wiring the binary
//! uses.  Simulated cards are fully functional; physical readers are absent
//! (no PC/SC backend) and no relay is configured, so those paths exercise the
//! failure handling.
//!
//! ```text
//! ActionRequest ──► ActionDispatcher ──► ConnectionRegistry ──► SimulatedTransport
//!                                                               └─ CardSimulator
//!                                                                  ├─ RandomApplet
//!                                                                  └─ EchoApplet
//! ```

use std::sync::Arc;
use std::time::Duration;

use rcard_core::{ActionKind, ActionRequest, ActionResponse};
use rcard_server::application::{wait_for_shutdown, ActionDispatcher, Gateway};
use rcard_server::domain::GatewayConfig;
use rcard_server::infrastructure::demo::DemoHooks;
use rcard_server::infrastructure::transport::{DefaultTransportFactory, NoReaderBackend};

const RANDOM_AID: &str = "01FFFF0405060708090102";
const ECHO_AID: &str = "01FFFF0405060708090103";

// ── Helpers ───────────────────────────────────────────────────────────────────

fn gateway_with(config: GatewayConfig) -> Arc<Gateway> {
    let factory = DefaultTransportFactory::new(Arc::new(NoReaderBackend));
    Gateway::new(&config, Arc::new(factory), Arc::new(DemoHooks))
}

fn dispatcher() -> ActionDispatcher {
    ActionDispatcher::new(gateway_with(GatewayConfig::default()))
}

fn sim(kind: ActionKind) -> ActionRequest {
    let mut req = ActionRequest::new(kind);
    req.target = Some("sim".into());
    req
}

async fn run(d: &ActionDispatcher, req: ActionRequest) -> ActionResponse {
    d.handle(req, None).await
}

// ── Simulated card flows ──────────────────────────────────────────────────────

/// Connect, select the echo applet and get the command data back.
#[tokio::test]
async fn test_simulated_echo_round_trip() {
    // Arrange
    let d = dispatcher();

    // Act
    let connected = run(&d, sim(ActionKind::Connect)).await;
    let mut select = sim(ActionKind::Select);
    select.aid = Some(ECHO_AID.into());
    let selected = run(&d, select).await;
    let mut send = sim(ActionKind::Send);
    send.apdu = Some("80010000 03 AABBCC".replace(' ', ""));
    let echoed = run(&d, send).await;

    // Assert
    assert_eq!(connected.result, 0);
    assert_eq!(connected.connected, Some(true));
    assert_eq!(selected.result, 0);
    assert_eq!(selected.sw, Some(0x9000));
    assert_eq!(echoed.response.as_deref(), Some("AABBCC9000"));
    assert_eq!(echoed.sw_hex.as_deref(), Some("9000"));
}

/// The random applet answers 32 fresh bytes per command.
#[tokio::test]
async fn test_simulated_random_applet() {
    let d = dispatcher();
    run(&d, sim(ActionKind::Connect)).await;
    let mut select = sim(ActionKind::Select);
    select.aid = Some(RANDOM_AID.into());
    assert_eq!(run(&d, select).await.result, 0);

    let mut send = sim(ActionKind::Send);
    send.apdu = Some("00000000".into());
    let first = run(&d, send.clone()).await;
    let second = run(&d, send).await;

    let first = first.response.unwrap();
    let second = second.response.unwrap();
    assert_eq!(first.len(), 2 * (32 + 2));
    assert!(first.ends_with("9000"));
    assert_ne!(first, second);
}

/// Selecting an AID nobody installed is a card-level failure, not a
/// gateway error.
#[tokio::test]
async fn test_select_unknown_applet_reports_card_status() {
    let d = dispatcher();
    run(&d, sim(ActionKind::Connect)).await;

    let mut select = sim(ActionKind::Select);
    select.aid = Some("A0000000041010".into());
    let resp = run(&d, select).await;

    assert_eq!(resp.result, 0);
    assert_eq!(resp.sw, Some(0x6A82));
    assert_eq!(resp.sw_hex.as_deref(), Some("6a82"));
}

/// Session tokens give each client its own simulated card.
#[tokio::test]
async fn test_session_tokens_isolate_simulated_cards() {
    // Arrange
    let d = dispatcher();
    let mut a = sim(ActionKind::Connect);
    a.csess = Some("alice".into());
    let mut b = sim(ActionKind::IsConnected);
    b.csess = Some("bob".into());

    // Act
    run(&d, a).await;
    let bob = run(&d, b).await;

    // Assert
    assert_eq!(bob.connected, Some(false));
    assert_eq!(bob.ctype.as_deref(), Some("?"));
    assert_eq!(d.gateway().registry().len(), 2);
}

#[tokio::test]
async fn test_is_connected_and_atr_follow_lifecycle() {
    let d = dispatcher();

    let before = run(&d, sim(ActionKind::IsConnected)).await;
    let empty_atr = run(&d, sim(ActionKind::Atr)).await;
    run(&d, sim(ActionKind::Connect)).await;
    let after = run(&d, sim(ActionKind::IsConnected)).await;
    let atr = run(&d, sim(ActionKind::Atr)).await;
    run(&d, sim(ActionKind::Disconnect)).await;
    let closed = run(&d, sim(ActionKind::IsConnected)).await;

    assert_eq!(before.connected, Some(false));
    assert_eq!(empty_atr.atr.as_deref(), Some(""));
    assert_eq!(after.connected, Some(true));
    assert_eq!(after.ctype.as_deref(), Some("sim"));
    assert_eq!(atr.atr.as_deref(), Some("3BFA1800008131FE454A434F5033315632333298"));
    assert_eq!(closed.connected, Some(false));
    assert_eq!(d.gateway().registry().len(), 1);
}

/// `reset` drops the selection: the echo applet must be selected again.
#[tokio::test]
async fn test_reset_then_reconnect_clears_selection() {
    let d = dispatcher();
    run(&d, sim(ActionKind::Connect)).await;
    let mut select = sim(ActionKind::Select);
    select.aid = Some(ECHO_AID.into());
    run(&d, select).await;

    run(&d, sim(ActionKind::Reset)).await;
    run(&d, sim(ActionKind::Connect)).await;
    let mut send = sim(ActionKind::Send);
    send.apdu = Some("0001000001FF".into());
    let resp = run(&d, send).await;

    assert_eq!(resp.sw, Some(0x6986));
}

// ── Failure paths ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_physical_card_without_readers_fails_to_connect() {
    let d = dispatcher();
    let resp = run(&d, ActionRequest::new(ActionKind::Connect)).await;
    assert_eq!(resp.result, -1);
    assert!(resp.error.unwrap().contains("reader not found"));
}

#[tokio::test]
async fn test_remote_card_without_relay_fails_to_connect() {
    let d = dispatcher();
    let mut req = ActionRequest::new(ActionKind::Connect);
    req.target = Some("remote".into());
    let resp = run(&d, req).await;
    assert_eq!(resp.result, -1);
    assert!(resp.error.unwrap().contains("no relay endpoint"));
}

#[tokio::test]
async fn test_send_before_connect_is_transmit_error() {
    let d = dispatcher();
    let mut send = sim(ActionKind::Send);
    send.apdu = Some("00A4040000".into());
    let resp = run(&d, send).await;
    assert_eq!(resp.result, -2);
}

#[tokio::test]
async fn test_bad_apdu_hex_is_validation_error() {
    let d = dispatcher();
    let mut send = sim(ActionKind::Send);
    send.apdu = Some("00A40".into());
    let resp = run(&d, send).await;
    assert_eq!(resp.result, -1);
    assert!(d.gateway().registry().is_empty());
}

#[tokio::test]
async fn test_unknown_action_leaves_registry_untouched() {
    let d = dispatcher();
    let resp = d.handle_text(r#"{"action":"format_card","target":"sim"}"#, Some("s1")).await;
    assert_eq!(resp.result, -1);
    assert_eq!(resp.error.as_deref(), Some("UnknownAction"));
    assert_eq!(resp.session.as_deref(), Some("s1"));
    assert!(d.gateway().registry().is_empty());
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_shutdown_refused_by_default() {
    let d = dispatcher();
    let resp = run(&d, ActionRequest::new(ActionKind::Shutdown)).await;
    assert_eq!(resp.result, -1);
    assert_eq!(resp.error.as_deref(), Some("not allowed"));
    assert!(!d.gateway().is_shutting_down());
}

#[tokio::test]
async fn test_allowed_shutdown_fires_after_grace() {
    // Arrange
    let mut config = GatewayConfig::default();
    config.policy.allow_terminate = true;
    config.shutdown_grace = Duration::from_millis(20);
    let d = ActionDispatcher::new(gateway_with(config));
    let signal = d.gateway().shutdown_signal();

    // Act
    let resp = run(&d, ActionRequest::new(ActionKind::Shutdown)).await;

    // Assert
    assert_eq!(resp.result, 0);
    tokio::time::timeout(Duration::from_secs(2), wait_for_shutdown(signal))
        .await
        .expect("shutdown should fire after the grace period");
    assert!(d.gateway().is_shutting_down());
}
