//! TOML configuration for the gateway.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration:
//!
//! ```toml
//! [gateway]
//! bind_address = "0.0.0.0"
//! port = 5093
//! max_pending_bytes = 16384
//! outbound_queue = 32
//!
//! [logging]
//! level = "info"
//!
//! [alarms.status_bits]
//! 0 = "sos"
//! 1 = "low_battery"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file.  Whole sections
//! use `#[serde(default)]`, which falls back to the section's `Default` impl.
//!
//! # Why are alarm bits strings? (for beginners)
//!
//! TOML table keys are always strings, even when they look like numbers.
//! [`AlarmConfig::codebook`] converts and range-checks them after parsing.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use trackgate_core::domain::alarm::MAX_STATUS_BIT;
use trackgate_core::protocol::frame::DEFAULT_MAX_PENDING;
use trackgate_core::AlarmCodebook;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` and `port` do not form a socket address.
    #[error("invalid bind address '{address}:{port}'")]
    InvalidBindAddress { address: String, port: u16 },

    /// An `[alarms.status_bits]` key is not a bit index in `0..=31`.
    #[error("invalid alarm status bit '{0}' (expected 0..=31)")]
    InvalidAlarmBit(String),

    /// A numeric setting is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub alarms: AlarmConfig,
}

/// Listener and per-connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    /// IP address to bind the device listener to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port devices connect to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Unterminated bytes kept per connection before the pending buffer is trimmed.
    #[serde(default = "default_max_pending_bytes")]
    pub max_pending_bytes: usize,
    /// Operator commands that may wait for one connection before sends fail.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Names for bits of the alarm status word.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlarmConfig {
    /// Bit index (as a string key) → alarm type name.
    #[serde(default)]
    pub status_bits: BTreeMap<String, String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5093
}
fn default_max_pending_bytes() -> usize {
    DEFAULT_MAX_PENDING
}
fn default_outbound_queue() -> usize {
    32
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_pending_bytes: default_max_pending_bytes(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl GatewayConfig {
    /// The listener address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] if `bind_address` is not an
    /// IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress {
                address: self.bind_address.clone(),
                port: self.port,
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl AlarmConfig {
    /// Builds the alarm codebook from `status_bits`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAlarmBit`] for a key that is not an
    /// integer in `0..=31`.
    pub fn codebook(&self) -> Result<AlarmCodebook, ConfigError> {
        let mut book = AlarmCodebook::new();
        for (key, name) in &self.status_bits {
            let bit: u8 = key
                .trim()
                .parse()
                .ok()
                .filter(|b| *b <= MAX_STATUS_BIT)
                .ok_or_else(|| ConfigError::InvalidAlarmBit(key.clone()))?;
            book = book.with_bit(bit, name.clone());
        }
        Ok(book)
    }
}

impl AppConfig {
    /// Checks the values serde cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.socket_addr()?;
        if self.gateway.max_pending_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gateway.max_pending_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.gateway.outbound_queue == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gateway.outbound_queue",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.alarms.codebook()?;
        Ok(())
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
