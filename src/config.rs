//! Configuration module for linechat.

use serde::Deserialize;
use std::path::Path;

use crate::i18n::BUILTIN_LOCALES;
use crate::{LinechatError, Result};

/// How incoming bytes are split into chat messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Buffer bytes and emit one message per terminated line.
    #[default]
    Line,
    /// Treat every read from the socket as exactly one message.
    ///
    /// Each read is decoded on its own, so a multi-byte character split
    /// across two reads arrives as U+FFFD on both sides.
    Read,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle timeout in seconds (0 disables the timeout).
    #[serde(default)]
    pub idle_timeout_secs: u64,
    /// Message framing mode.
    #[serde(default)]
    pub framing: Framing,
    /// Longest unterminated line kept in the buffer before it is flushed.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_connections() -> usize {
    64
}

fn default_max_line_bytes() -> usize {
    4096
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            idle_timeout_secs: 0,
            framing: Framing::default(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

/// Chat configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Number of recent messages replayed to a newly joined client.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_history_size() -> usize {
    10
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
        }
    }
}

/// Locale configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocaleConfig {
    /// Language code (ru / en).
    #[serde(default = "default_language")]
    pub language: String,
    /// Directory holding `<language>.toml` catalogues. Built-ins are used when unset.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_language() -> String {
    "ru".to_string()
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            path: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/linechat.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Chat configuration.
    #[serde(default)]
    pub chat: ChatConfig,
    /// Locale configuration.
    #[serde(default)]
    pub locale: LocaleConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(LinechatError::Io)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| LinechatError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `LINECHAT_HOST`: bind address
    /// - `LINECHAT_PORT`: listening port (ignored unless it parses as a port)
    /// - `LINECHAT_LOG_LEVEL`: log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("LINECHAT_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port) = std::env::var("LINECHAT_PORT") {
            if let Ok(port) = port.trim().parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(level) = std::env::var("LINECHAT_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - `max_connections` or `max_line_bytes` is zero
    /// - the language has no built-in catalogue and no locale path is set
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(LinechatError::Validation(
                "server.max_connections must be at least 1".to_string(),
            ));
        }
        if self.server.max_line_bytes == 0 {
            return Err(LinechatError::Validation(
                "server.max_line_bytes must be at least 1".to_string(),
            ));
        }
        if self.locale.path.is_none() && !BUILTIN_LOCALES.contains(&self.locale.language.as_str())
        {
            return Err(LinechatError::Validation(format!(
                "no built-in messages for language '{}'; set locale.path",
                self.locale.language
            )));
        }
        Ok(())
    }
}
