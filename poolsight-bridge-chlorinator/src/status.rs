//! Bridge status reporting.

use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::publisher::TopicPublisher;

/// Topic suffix for status messages, under the publish namespace.
pub const STATUS_SUFFIX: &str = "@/status";

/// Bridge status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name.
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current status ("running", "offline").
    pub status: String,
    /// Additional metadata.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    /// Create a new status with "running" state.
    pub fn running(bridge: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: "running".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Create a status with "offline" state.
    pub fn offline(bridge: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: "offline".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Publish to `<namespace>/@/status`.
    pub async fn publish(&self, publisher: &TopicPublisher) -> Result<(), PublishError> {
        publisher.publish_json(STATUS_SUFFIX, self).await
    }
}
