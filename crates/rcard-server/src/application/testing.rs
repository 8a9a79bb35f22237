//! Recording test doubles for the application layer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rcard_core::CardType;

use super::gateway::Gateway;
use super::registry::NoHooks;
use super::transport::{Transport, TransportConfig, TransportError};
use crate::domain::GatewayConfig;

/// A gateway whose every transport is a fresh [`ScriptedTransport`].
pub fn scripted_gateway(config: &GatewayConfig) -> Arc<Gateway> {
    let factory =
        |kind: CardType| -> Box<dyn Transport> { Box::new(ScriptedTransport::new(kind).0) };
    Gateway::new(config, Arc::new(factory), Arc::new(NoHooks))
}

/// Like [`scripted_gateway`], but every exchange takes `delay`.
pub fn slow_gateway(config: &GatewayConfig, delay: Duration) -> Arc<Gateway> {
    let factory = move |kind: CardType| -> Box<dyn Transport> {
        Box::new(ScriptedTransport::with_delay(kind, delay).0)
    };
    Gateway::new(config, Arc::new(factory), Arc::new(NoHooks))
}

#[derive(Default)]
struct Script {
    sent: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    fail_next: Option<String>,
    drop_next: Option<String>,
    fail_connect: Option<String>,
    connects: usize,
    disconnects: Vec<bool>,
}

/// Handle for inspecting and steering a [`ScriptedTransport`].
#[derive(Clone, Default)]
pub struct TransportLog(Arc<Mutex<Script>>);

impl TransportLog {
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().sent.clone()
    }

    pub fn disconnects(&self) -> Vec<bool> {
        self.0.lock().unwrap().disconnects.clone()
    }

    pub fn connects(&self) -> usize {
        self.0.lock().unwrap().connects
    }

    /// Queues a raw reply; `9000` is answered when the queue is empty.
    pub fn push_reply(&self, raw: Vec<u8>) {
        self.0.lock().unwrap().replies.push_back(raw);
    }

    pub fn fail_next(&self, message: &str) {
        self.0.lock().unwrap().fail_next = Some(message.to_string());
    }

    /// Fails the next exchange and loses the channel with it.
    pub fn drop_next(&self, message: &str) {
        self.0.lock().unwrap().drop_next = Some(message.to_string());
    }

    pub fn fail_connect(&self, message: &str) {
        self.0.lock().unwrap().fail_connect = Some(message.to_string());
    }
}

/// A transport that records every call and replays scripted answers.
pub struct ScriptedTransport {
    kind: CardType,
    connected: bool,
    delay: Duration,
    log: TransportLog,
}

impl ScriptedTransport {
    pub const ATR: [u8; 4] = [0x3B, 0x02, 0x14, 0x50];

    pub fn new(kind: CardType) -> (Self, TransportLog) {
        Self::with_delay(kind, Duration::ZERO)
    }

    /// A transport whose every exchange blocks for `delay`.
    pub fn with_delay(kind: CardType, delay: Duration) -> (Self, TransportLog) {
        let log = TransportLog::default();
        (
            Self {
                kind,
                connected: false,
                delay,
                log: log.clone(),
            },
            log,
        )
    }
}

impl Transport for ScriptedTransport {
    fn kind(&self) -> CardType {
        self.kind
    }

    fn connect(&mut self, _config: &TransportConfig) -> Result<(), TransportError> {
        let mut script = self.log.0.lock().unwrap();
        script.connects += 1;
        if let Some(msg) = script.fail_connect.take() {
            return Err(TransportError::ConnectFailed(msg));
        }
        self.connected = true;
        Ok(())
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let mut script = self.log.0.lock().unwrap();
        script.sent.push(command.to_vec());
        if let Some(msg) = script.drop_next.take() {
            self.connected = false;
            return Err(TransportError::Backend(msg));
        }
        if let Some(msg) = script.fail_next.take() {
            return Err(TransportError::Backend(msg));
        }
        Ok(script.replies.pop_front().unwrap_or_else(|| vec![0x90, 0x00]))
    }

    fn disconnect(&mut self, reset: bool) {
        self.connected = false;
        self.log.0.lock().unwrap().disconnects.push(reset);
    }

    fn atr(&self) -> Option<Vec<u8>> {
        self.connected.then(|| Self::ATR.to_vec())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
