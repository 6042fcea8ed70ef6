use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Upgrade and per-connection I/O settings applied by the connection manager.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Read buffer size handed to the upgrade, in bytes
    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,
    /// Write buffer size handed to the upgrade, in bytes
    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,
    /// Accepted `Origin` header values. Empty accepts every origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Read deadline in milliseconds, refreshed by every pong
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Deadline for a single frame write in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Interval between server pings in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Largest accepted inbound data frame, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Default outbound queue capacity per connection
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_buffer_size() -> usize {
    1024
}

fn default_read_timeout_ms() -> u64 {
    60_000
}

fn default_write_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    54_000 // 90% of the read timeout
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_queue_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // ARA_SERVER__PORT, ARA_WEBSOCKET__HEARTBEAT_INTERVAL_MS, ...
            .add_source(
                Environment::with_prefix("ARA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("websocket.allowed_origins"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.websocket.validate()?;
        Ok(settings)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl WebSocketConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Reject combinations the I/O driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 || self.write_timeout_ms == 0 {
            return Err(AppError::Validation(
                "heartbeat interval and write timeout must be non-zero".into(),
            ));
        }
        if self.read_timeout_ms <= self.heartbeat_interval_ms {
            return Err(AppError::Validation(format!(
                "read timeout ({}ms) must exceed heartbeat interval ({}ms)",
                self.read_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        if self.queue_capacity == 0 {
            return Err(AppError::Validation("queue capacity must be at least 1".into()));
        }
        if self.max_message_size == 0 {
            return Err(AppError::Validation("max message size must be non-zero".into()));
        }
        Ok(())
    }

    /// Origin predicate applied before the upgrade. Requests without an
    /// Origin header come from non-browser clients and are accepted.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            _ if self.allowed_origins.is_empty() => true,
            None => true,
            Some(origin) => self
                .allowed_origins
                .iter()
                .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin)),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: default_buffer_size(),
            write_buffer_size: default_buffer_size(),
            allowed_origins: vec![],
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_message_size: default_max_message_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8081);

        let ws = WebSocketConfig::default();
        assert!(ws.validate().is_ok());
        assert!(ws.read_timeout() > ws.heartbeat_interval());
    }

    #[test]
    fn test_read_timeout_must_exceed_heartbeat() {
        let ws = WebSocketConfig {
            read_timeout_ms: 1000,
            heartbeat_interval_ms: 1000,
            ..Default::default()
        };
        assert!(matches!(ws.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let ws = WebSocketConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(ws.validate().is_err());
    }

    #[test]
    fn test_origin_check() {
        let open = WebSocketConfig::default();
        assert!(open.origin_allowed(Some("https://anything.example")));

        let restricted = WebSocketConfig {
            allowed_origins: vec!["https://app.example.com".into()],
            ..Default::default()
        };
        assert!(restricted.origin_allowed(Some("https://app.example.com")));
        assert!(restricted.origin_allowed(None));
        assert!(!restricted.origin_allowed(Some("https://evil.example.com")));
    }

    #[test]
    fn test_deserialize_partial_section() {
        let settings: Settings = Config::builder()
            .set_override("websocket.heartbeat_interval_ms", 500)
            .and_then(|b| b.set_override("websocket.read_timeout_ms", 2000))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .unwrap();

        assert_eq!(settings.websocket.heartbeat_interval_ms, 500);
        assert_eq!(settings.websocket.queue_capacity, 256);
        assert_eq!(settings.server.port, 8081);
        assert!(!settings.logging.json);
    }
}
