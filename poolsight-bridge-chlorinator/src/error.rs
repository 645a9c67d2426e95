//! Error types for the chlorinator bridge.

use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// A single field could not be read this cycle.
#[derive(Debug, Error)]
#[error("Failed to read '{key}' ({function} @ {address:#06x}): {source}")]
pub struct FieldError {
    pub key: &'static str,
    pub function: &'static str,
    pub address: u16,
    #[source]
    pub source: TransportError,
}

/// A single reading could not be handed to the sink.
#[derive(Debug, Error)]
#[error("Failed to publish to '{topic}': {message}")]
pub struct PublishError {
    pub topic: String,
    pub message: String,
}

/// Errors that end a bridge run.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to open transport: {0}")]
    Connect(#[source] TransportError),

    /// Neither probe register answered.
    #[error("Device at unit {unit_id} did not answer any probe")]
    ProbeFailed { unit_id: u8 },

    #[error("Transport lost during polling: {0}")]
    TransportLost(#[source] TransportError),

    #[error("Telemetry sink error: {0}")]
    Sink(#[from] poolsight_common::Error),
}

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_field_error_identifies_field() {
        let err = FieldError {
            key: "ph",
            function: "input",
            address: 1,
            source: TransportError::Timeout(Duration::from_secs(3)),
        };
        let text = err.to_string();
        assert!(text.contains("'ph'"));
        assert!(text.contains("input @ 0x0001"));
        assert!(text.contains("3s"));
    }

    #[test]
    fn test_run_errors_name_their_cause() {
        let config = ConfigError::Validation("poll.status_every must be at least 1".to_string());
        let err = BridgeError::from(config);
        assert!(matches!(err, BridgeError::Config(_)));
        assert!(err.to_string().contains("status_every"));

        let err = BridgeError::Connect(TransportError::Connect("Connection timeout".to_string()));
        assert!(err.to_string().starts_with("Failed to open transport"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
