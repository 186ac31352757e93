use std::io;

/// Custom error type for hook_relay operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Payload parsing failed: {0}")]
    ParseFailure(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Build target '{target}' rejected the notification: {status}")]
    DeliveryRejected { target: String, status: String },

    #[error("Notification to build target '{target}' failed: {source}")]
    DeliveryFailed {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Dispatch queue is full")]
    QueueFull,

    #[error("Dispatch queue is closed")]
    QueueClosed,

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("YAML parsing error: {0}")]
    YamlParseError(#[from] serde_yaml::Error),
}

impl RelayError {
    /// True for both kinds of failed outbound notification.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(
            self,
            RelayError::DeliveryRejected { .. } | RelayError::DeliveryFailed { .. }
        )
    }
}

/// Helper type for Results that use RelayError
pub type Result<T> = std::result::Result<T, RelayError>;
