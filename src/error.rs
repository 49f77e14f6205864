//! Error types for linechat.

use thiserror::Error;

/// Common error type for linechat.
#[derive(Error, Debug)]
pub enum LinechatError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for configuration values.
    #[error("validation error: {0}")]
    Validation(String),

    /// Message catalogue error.
    #[error("locale error: {0}")]
    Locale(#[from] crate::i18n::I18nError),
}

/// Result type alias for linechat operations.
pub type Result<T> = std::result::Result<T, LinechatError>;
