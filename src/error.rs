//! Error types for node-relay.

use std::time::Duration;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Platform channel errors: faults at the collaborator boundary
/// (auth, connection) that a supervisor handles, not the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Channel {name} disconnected: {reason}")]
    Disconnected { name: String, reason: String },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },
}

/// Per-destination delivery errors, classified so the sender can pick
/// the right recovery: mandatory wait, bounded retry, or give up.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    /// The platform demands a cooldown before the next attempt.
    /// Not a fault: the wait is mandatory and deterministic.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Network/timeout/unavailable; worth retrying with backoff.
    #[error("transient send failure: {0}")]
    Transient(String),

    /// Bad destination or missing permission; retrying cannot help.
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

impl SendError {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient(_) => "transient",
            Self::Permanent(_) => "permanent",
        }
    }
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_error_labels() {
        let rl = SendError::RateLimited {
            retry_after: Duration::from_secs(3),
        };
        assert_eq!(rl.label(), "rate_limited");
        assert_eq!(SendError::Transient("timeout".into()).label(), "transient");
        assert_eq!(
            SendError::Permanent("chat not found".into()).label(),
            "permanent"
        );
    }

    #[test]
    fn send_error_display_includes_reason() {
        let err = SendError::Permanent("bot was kicked".into());
        assert!(err.to_string().contains("bot was kicked"));
    }
}
