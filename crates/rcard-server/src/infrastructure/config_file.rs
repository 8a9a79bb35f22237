//! TOML configuration file.
//!
//! Every field is optional; absent fields keep the value already present in
//! the [`GatewayConfig`] the file is applied to.  Command-line flags are
//! applied afterwards and win over the file.
//!
//! ```toml
//! [server]
//! ws_port = 9900
//! rest_port = 9901
//! bind = "0.0.0.0"
//! workers = 5
//! request_timeout_secs = 5
//!
//! [policy]
//! allow_terminate = false
//! allow_pick_reader = true
//! default_reader_index = 0
//!
//! [apdu]
//! fix_length_field = true
//! fix_expected_length = false
//! expected_length = 255
//!
//! [keepalive]
//! ping_interval_secs = 10
//! pong_timeout_secs = 15
//!
//! [reader]
//! hint = "YubiKey"
//!
//! [relay]
//! host = "10.0.0.7"
//! port = 35963
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{GatewayConfig, RelayEndpoint, DEFAULT_RELAY_PORT};

/// Error type for configuration file loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level file layout.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GatewayFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub apdu: ApduSection,
    #[serde(default)]
    pub keepalive: KeepaliveSection,
    #[serde(default)]
    pub reader: ReaderSection,
    pub relay: Option<RelaySection>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub ws_port: Option<u16>,
    pub rest_port: Option<u16>,
    /// Address both listeners bind to.
    pub bind: Option<IpAddr>,
    pub workers: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    /// Install the demo applets into simulated cards.
    pub demo_applets: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    pub allow_terminate: Option<bool>,
    pub allow_pick_reader: Option<bool>,
    pub default_reader_index: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ApduSection {
    pub fix_length_field: Option<bool>,
    pub fix_expected_length: Option<bool>,
    pub expected_length: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct KeepaliveSection {
    pub ping_interval_secs: Option<u64>,
    pub pong_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReaderSection {
    /// Substring of the physical reader name.
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    pub host: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
}

fn default_relay_port() -> u16 {
    DEFAULT_RELAY_PORT
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl GatewayFile {
    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overwrites the fields of `config` that the file sets.
    pub fn apply_to(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        let server = &self.server;
        if let Some(ip) = server.bind {
            config.ws_bind_addr.set_ip(ip);
            config.rest_bind_addr.set_ip(ip);
        }
        if let Some(port) = server.ws_port {
            config.ws_bind_addr.set_port(port);
        }
        if let Some(port) = server.rest_port {
            config.rest_bind_addr.set_port(port);
        }
        if let Some(workers) = server.workers {
            if workers == 0 {
                return Err(ConfigError::Invalid {
                    field: "server.workers",
                    reason: "must be at least 1".into(),
                });
            }
            config.workers = workers;
        }
        if let Some(secs) = server.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = server.shutdown_grace_ms {
            config.shutdown_grace = Duration::from_millis(ms);
        }
        if let Some(demo) = server.demo_applets {
            config.demo_applets = demo;
        }

        let policy = &self.policy;
        if let Some(v) = policy.allow_terminate {
            config.policy.allow_terminate = v;
        }
        if let Some(v) = policy.allow_pick_reader {
            config.policy.allow_pick_reader = v;
        }
        if let Some(v) = policy.default_reader_index {
            config.policy.default_reader_index = v;
        }

        let apdu = &self.apdu;
        if let Some(v) = apdu.fix_length_field {
            config.fixups.fix_length_field = v;
        }
        if let Some(v) = apdu.fix_expected_length {
            config.fixups.fix_expected_length = v;
        }
        if let Some(v) = apdu.expected_length {
            config.fixups.expected_length = v;
        }

        let keepalive = &self.keepalive;
        if let Some(secs) = keepalive.ping_interval_secs {
            config.ping_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = keepalive.pong_timeout_secs {
            config.pong_timeout = Duration::from_secs(secs);
        }
        if config.ping_interval.is_zero() || config.pong_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "keepalive",
                reason: "intervals must be non-zero".into(),
            });
        }

        if let Some(hint) = self.reader.hint.as_deref().map(str::trim) {
            config.reader_hint = (!hint.is_empty()).then(|| hint.to_string());
        }
        if let Some(relay) = &self.relay {
            config.relay = Some(RelayEndpoint {
                host: relay.host.clone(),
                port: relay.port,
            });
        }
        Ok(())
    }
}

/// Builds a [`GatewayConfig`] from defaults plus the file at `path`.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let mut config = GatewayConfig::default();
    GatewayFile::load(path)?.apply_to(&mut config)?;
    Ok(config)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_changes_nothing() {
        // Arrange
        let file = GatewayFile::parse("").unwrap();
        let mut config = GatewayConfig::default();

        // Act
        file.apply_to(&mut config).unwrap();

        // Assert
        assert_eq!(config.ws_bind_addr, GatewayConfig::default().ws_bind_addr);
        assert_eq!(config.policy, GatewayConfig::default().policy);
        assert!(config.relay.is_none());
    }

    #[test]
    fn test_full_file_overrides_every_section() {
        let text = r#"
            [server]
            ws_port = 19900
            rest_port = 19901
            bind = "127.0.0.1"
            workers = 2
            request_timeout_secs = 3
            demo_applets = false

            [policy]
            allow_terminate = true
            allow_pick_reader = true
            default_reader_index = 1

            [apdu]
            fix_expected_length = true
            expected_length = 0

            [keepalive]
            ping_interval_secs = 4
            pong_timeout_secs = 6

            [reader]
            hint = "  YubiKey "

            [relay]
            host = "10.0.0.7"
        "#;
        let mut config = GatewayConfig::default();

        GatewayFile::parse(text).unwrap().apply_to(&mut config).unwrap();

        assert_eq!(config.ws_bind_addr, "127.0.0.1:19900".parse().unwrap());
        assert_eq!(config.rest_bind_addr, "127.0.0.1:19901".parse().unwrap());
        assert_eq!(config.workers, 2);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert!(!config.demo_applets);
        assert!(config.policy.allow_terminate);
        assert!(config.policy.allow_pick_reader);
        assert_eq!(config.policy.default_reader_index, 1);
        assert!(config.fixups.fix_length_field);
        assert!(config.fixups.fix_expected_length);
        assert_eq!(config.fixups.expected_length, 0);
        assert_eq!(config.ping_interval, Duration::from_secs(4));
        assert_eq!(config.pong_timeout, Duration::from_secs(6));
        assert_eq!(config.reader_hint.as_deref(), Some("YubiKey"));
        assert_eq!(
            config.relay,
            Some(RelayEndpoint {
                host: "10.0.0.7".into(),
                port: DEFAULT_RELAY_PORT
            })
        );
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let result = GatewayFile::parse("[server]\nport = 1\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let file = GatewayFile::parse("[server]\nworkers = 0\n").unwrap();
        let result = file.apply_to(&mut GatewayConfig::default());
        assert!(matches!(result, Err(ConfigError::Invalid { field: "server.workers", .. })));
    }

    #[test]
    fn test_missing_file_is_io_error_with_path() {
        let path = Path::new("/nonexistent/rcard/config.toml");
        let err = load_config(path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/rcard/config.toml"));
    }
}
