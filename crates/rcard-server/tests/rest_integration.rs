//! Integration tests of the REST front-end.
//!
//! Most tests drive the axum [`router`] in-process with
//! `tower::ServiceExt::oneshot`; the last ones serve it on a real socket to
//! cover raw HTTP and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;

use rcard_server::application::Gateway;
use rcard_server::domain::GatewayConfig;
use rcard_server::infrastructure::demo::DemoHooks;
use rcard_server::infrastructure::transport::{DefaultTransportFactory, NoReaderBackend};
use rcard_server::infrastructure::{router, serve_rest};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn gateway(config: &GatewayConfig) -> Arc<Gateway> {
    let factory = DefaultTransportFactory::new(Arc::new(NoReaderBackend));
    Gateway::new(config, Arc::new(factory), Arc::new(DemoHooks))
}

fn app() -> (Router, Arc<Gateway>) {
    let gateway = gateway(&GatewayConfig::default());
    (router(Arc::clone(&gateway), Duration::from_secs(5)), gateway)
}

async fn call(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_simulated_card_by_path_routes() {
    // Arrange
    let (app, gateway) = app();

    // Act
    let (_, connected) = call(&app, Method::POST, "/v1/card/sim/0/connect", "").await;
    let (_, selected) =
        call(&app, Method::GET, "/v1/card/sim/0/select/01FFFF0405060708090103", "").await;
    let (_, echoed) = call(&app, Method::GET, "/v1/card/sim/0/cmd/0001000001AB", "").await;
    let (_, atr) = call(&app, Method::GET, "/v1/card/sim/0/atr", "").await;

    // Assert
    assert_eq!(connected["connected"], true);
    assert_eq!(selected["sw_hex"], "9000");
    assert_eq!(echoed["response"], "AB9000");
    assert_eq!(atr["atr"], "3BFA1800008131FE454A434F5033315632333298");
    assert_eq!(gateway.registry().len(), 1);
    assert_eq!(gateway.clients().current(), 0);
}

#[tokio::test]
async fn test_card_route_with_json_body_and_session_token() {
    let (app, gateway) = app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/card",
        r#"{"action":"connect","target":"sim","csess":"tok-1","rid":5}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], 0);
    // REST responses are not session-oriented.
    assert!(body.get("session").is_none());
    assert!(body.get("rid").is_none());
    assert_eq!(gateway.registry().len(), 1);
}

#[tokio::test]
async fn test_session_token_on_physical_card_is_rejected() {
    let (app, gateway) = app();

    let (_, body) = call(
        &app,
        Method::POST,
        "/v1/card",
        r#"{"action":"connect","target":"card","csess":"tok-1"}"#,
    )
    .await;

    assert_eq!(body["result"], -1);
    assert!(gateway.registry().is_empty());
}

#[tokio::test]
async fn test_physical_connect_without_readers_reports_error() {
    let (app, _) = app();
    let (status, body) = call(&app, Method::GET, "/v1/card/card/0/connect", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], -1);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_unknown_target_is_validation_error() {
    let (app, _) = app();
    let (_, body) = call(&app, Method::GET, "/v1/card/nfc/0/connect", "").await;
    assert_eq!(body["result"], -1);
    assert_eq!(body["error"], "No such target: nfc");
}

// ── Real socket ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_serve_rest_answers_http_and_stops_on_shutdown() {
    // Arrange
    let gateway = gateway(&GatewayConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_rest(
        listener,
        Arc::clone(&gateway),
        Duration::from_secs(5),
    ));

    // Act
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /v1/ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    gateway.trigger_shutdown();
    let stopped = tokio::time::timeout(Duration::from_secs(5), server).await;

    // Assert
    assert!(raw.starts_with("HTTP/1.1 200"));
    assert!(raw.contains("application/json"));
    assert!(raw.ends_with(r#"{"success":1}"#));
    assert!(matches!(stopped, Ok(Ok(Ok(())))));
}
