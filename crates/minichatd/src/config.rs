//! Server configuration.
//!
//! Layers, lowest precedence first:
//! 1. `ServerConfig::default()`
//! 2. TOML file (`--config PATH`, or `<config_dir>/minichat/minichatd.toml` if present)
//! 3. `MINICHAT_ADDR` environment variable
//! 4. CLI flags (applied by the binary)
//!
//! ```toml
//! bind = "127.0.0.1:5555"
//! outbound_capacity = 256
//! write_timeout_ms = 10000
//! max_line_length = 65536
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Default TCP port
pub const DEFAULT_PORT: u16 = 5555;

/// Environment variable overriding the bind address
pub const ADDR_ENV: &str = "MINICHAT_ADDR";

/// Server configuration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Lines buffered per connection before a recipient counts as stalled
    pub outbound_capacity: usize,

    /// Maximum time a single write to a peer may take
    pub write_timeout: Duration,

    /// Longest accepted input line in bytes
    pub max_line_length: usize,

    /// How long shutdown waits for connections to finish
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            outbound_capacity: 256,
            write_timeout: Duration::from_secs(10),
            max_line_length: 64 * 1024, // 64KB
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// On-disk representation; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    bind: Option<String>,
    port: Option<u16>,
    outbound_capacity: Option<usize>,
    write_timeout_ms: Option<u64>,
    max_line_length: Option<usize>,
    shutdown_grace_ms: Option<u64>,
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_bind_addr(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Parses TOML text on top of the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut config = Self::default();
        if let Some(bind) = file.bind {
            config.apply_addr_override(&bind)?;
        }
        if let Some(port) = file.port {
            config.bind_addr.set_port(port);
        }
        if let Some(capacity) = file.outbound_capacity {
            config.outbound_capacity = capacity;
        }
        if let Some(ms) = file.write_timeout_ms {
            config.write_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = file.max_line_length {
            config.max_line_length = max;
        }
        if let Some(ms) = file.shutdown_grace_ms {
            config.shutdown_grace = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&text)
    }

    /// Loads `path` if given, else the default config file if it exists,
    /// else returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match default_config_path() {
            Some(default_path) if default_path.exists() => Self::load(&default_path),
            _ => Ok(Self::default()),
        }
    }

    /// Applies the `MINICHAT_ADDR` environment override, if set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        match std::env::var(ADDR_ENV) {
            Ok(value) => self.apply_addr_override(&value),
            Err(_) => Ok(()),
        }
    }

    /// Replaces the bind address with `value` (`ip:port`, or a bare IP
    /// keeping the current port).
    pub fn apply_addr_override(&mut self, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        if let Ok(addr) = value.parse::<SocketAddr>() {
            self.bind_addr = addr;
            return Ok(());
        }
        if let Ok(ip) = value.parse::<IpAddr>() {
            self.bind_addr.set_ip(ip);
            return Ok(());
        }
        Err(ConfigError::InvalidAddress(value.to_string()))
    }

    /// Replaces the port, keeping the bind IP.
    pub fn set_port(&mut self, port: u16) {
        self.bind_addr.set_port(port);
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "outbound_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_line_length",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.write_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "write_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Location of the optional config file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("minichat").join("minichatd.toml"))
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Invalid config file: {0}")]
    Parse(String),

    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("Invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
