//! # Configuration Management
//!
//! Connection and logging settings for the Bitswarm client.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults, optionally tweaked through `default_with_overrides()`
//!
//! Durations are written as milliseconds in TOML.
//!
//! ```toml
//! [client]
//! host = "game.example.com"
//! tcp_port = 9933
//! udp_port = 9934
//! encryption_enabled = true
//! lag_probe_interval = 4000
//! ```

use crate::error::{BitswarmError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default TCP port of a Bitswarm server
pub const DEFAULT_TCP_PORT: u16 = 9933;

/// Smallest frame limit worth configuring
pub const MIN_FRAME_SIZE: usize = 64;

/// Largest frame limit accepted by validation (100 MB)
pub const MAX_FRAME_SIZE_LIMIT: usize = 100 * 1024 * 1024;

/// Top-level SDK configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SdkConfig {
    /// Connection settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SdkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| BitswarmError::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| BitswarmError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| BitswarmError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `BITSWARM_*` environment variables.
    ///
    /// Unparseable numeric values are reported rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("BITSWARM_HOST") {
            config.client.host = host;
        }

        if let Some(port) = env_parse::<u16>("BITSWARM_TCP_PORT")? {
            config.client.tcp_port = port;
        }

        if let Some(port) = env_parse::<u16>("BITSWARM_UDP_PORT")? {
            config.client.udp_port = Some(port);
        }

        if let Some(enabled) = env_parse::<bool>("BITSWARM_ENCRYPTION")? {
            config.client.encryption_enabled = enabled;
        }

        if let Some(ms) = env_parse::<u64>("BITSWARM_LAG_INTERVAL_MS")? {
            config.client.lag_probe_interval = Duration::from_millis(ms);
        }

        if let Some(size) = env_parse::<usize>("BITSWARM_MAX_FRAME_SIZE")? {
            config.client.max_frame_size = size;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BitswarmError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| BitswarmError::Config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BitswarmError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| BitswarmError::Config(format!("Invalid value for {name}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or IP
    pub host: String,

    /// Control channel port
    pub tcp_port: u16,

    /// UDP channel port; `None` disables UDP
    pub udp_port: Option<u16>,

    /// Whether a session cipher may be installed after the handshake
    pub encryption_enabled: bool,

    /// Payloads at least this large are LZ4-compressed; 0 disables compression
    pub compression_threshold: usize,

    /// Interval between lag probes
    #[serde(with = "duration_serde")]
    pub lag_probe_interval: Duration,

    /// Consecutive unanswered probes tolerated before a lag timeout
    pub lag_miss_threshold: u32,

    /// Number of RTT samples in the moving average
    pub lag_average_window: usize,

    /// Largest accepted frame payload in bytes
    pub max_frame_size: usize,

    /// Timeout for the TCP connect
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: None,
            encryption_enabled: false,
            compression_threshold: 1024,
            lag_probe_interval: timeout::LAG_PROBE_INTERVAL,
            lag_miss_threshold: 3,
            lag_average_window: 10,
            max_frame_size: crate::core::codec::DEFAULT_MAX_FRAME_SIZE,
            connect_timeout: timeout::DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// `host:port` of the control channel
    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host, self.tcp_port)
    }

    /// `host:port` of the UDP channel, if one is configured
    pub fn udp_addr(&self) -> Option<String> {
        self.udp_port.map(|port| format!("{}:{}", self.host, port))
    }

    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push("Host cannot be empty".to_string());
        }

        if self.tcp_port == 0 {
            errors.push("TCP port must be greater than 0".to_string());
        }

        if self.udp_port == Some(0) {
            errors.push("UDP port must be greater than 0 when set".to_string());
        }

        if self.lag_probe_interval.as_millis() < 100 {
            errors.push("Lag probe interval too short (minimum: 100ms)".to_string());
        } else if self.lag_probe_interval.as_secs() > 3600 {
            errors.push("Lag probe interval too long (maximum: 1 hour)".to_string());
        }

        if self.lag_miss_threshold == 0 {
            errors.push("Lag miss threshold must be at least 1".to_string());
        }

        if self.lag_average_window == 0 {
            errors.push("Lag average window must be at least 1".to_string());
        }

        if self.max_frame_size < MIN_FRAME_SIZE {
            errors.push(format!(
                "Max frame size too small: {} bytes (minimum: {MIN_FRAME_SIZE})",
                self.max_frame_size
            ));
        } else if self.max_frame_size > MAX_FRAME_SIZE_LIMIT {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum: 100 MB)",
                self.max_frame_size
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("bitswarm-client"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Durations as integer milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// `tracing::Level` as a lowercase string
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
