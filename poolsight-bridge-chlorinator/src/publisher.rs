//! Publisher adapter: decoded readings to `(topic, payload)` messages.

use std::collections::HashMap;

use poolsight_common::{Format, Sink, TelemetryPoint, encode};
use tracing::{debug, warn};

use crate::catalog::{Catalog, RegisterSpec};
use crate::config::PayloadFormat;
use crate::decode::DecodedReading;
use crate::error::PublishError;
use crate::poller::CycleResult;

/// Build a topic from a namespace and a field key.
pub fn build_topic(namespace: &str, key: &str) -> String {
    format!("{}/{}", namespace.trim_matches('/'), key)
}

/// Maps readings to topics and forwards them to the sink.
///
/// Owns the sink handle; [`TopicPublisher::close`] releases it.
pub struct TopicPublisher {
    sink: Box<dyn Sink>,
    namespace: String,
    format: PayloadFormat,
    source: String,
    /// Register metadata used as labels in structured payloads.
    labels: HashMap<&'static str, (u16, &'static str, &'static str)>,
}

impl TopicPublisher {
    pub fn new(
        sink: Box<dyn Sink>,
        namespace: impl Into<String>,
        format: PayloadFormat,
        source: impl Into<String>,
        catalog: &Catalog,
    ) -> Self {
        let labels = catalog
            .iter()
            .map(|spec: &RegisterSpec| {
                (
                    spec.key,
                    (spec.address, spec.function.as_str(), spec.kind.as_str()),
                )
            })
            .collect();

        Self {
            sink,
            namespace: namespace.into(),
            format,
            source: source.into(),
            labels,
        }
    }

    /// Topic a reading with this key is published on.
    pub fn topic_for(&self, key: &str) -> String {
        build_topic(&self.namespace, key)
    }

    /// Render the payload for one reading.
    pub fn payload_for(&self, reading: &DecodedReading) -> Result<Vec<u8>, PublishError> {
        let format = match self.format {
            PayloadFormat::Plain => return Ok(reading.value.to_string().into_bytes()),
            PayloadFormat::Json => Format::Json,
            PayloadFormat::Cbor => Format::Cbor,
        };

        let mut point = TelemetryPoint::new(&self.source, reading.key, reading.value.into())
            .with_timestamp(reading.read_at)
            .with_unit(reading.unit);
        if let Some((address, function, kind)) = self.labels.get(reading.key) {
            point = point
                .with_label("address", address.to_string())
                .with_label("function", *function)
                .with_label("kind", *kind);
        }

        encode(&point, format).map_err(|e| PublishError {
            topic: self.topic_for(reading.key),
            message: e.to_string(),
        })
    }

    /// Publish one reading. One message per call, no retry.
    pub async fn publish(&self, reading: &DecodedReading) -> Result<(), PublishError> {
        let topic = self.topic_for(reading.key);
        let payload = self.payload_for(reading)?;

        self.sink
            .put(&topic, payload)
            .await
            .map_err(|e| PublishError {
                topic: topic.clone(),
                message: e.to_string(),
            })?;

        debug!(topic = %topic, value = %reading.value, unit = reading.unit, "Published");
        Ok(())
    }

    /// Publish every reading of a cycle. A failed reading never stops the rest.
    pub async fn publish_cycle(&self, result: &CycleResult) -> PublishStats {
        let mut stats = PublishStats::default();

        for reading in &result.readings {
            match self.publish(reading).await {
                Ok(()) => stats.success += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(cycle = result.index, error = %e, "Failed to publish reading");
                }
            }
        }

        stats
    }

    /// Publish a raw JSON document under `<namespace>/<suffix>`.
    pub async fn publish_json<T: serde::Serialize>(
        &self,
        suffix: &str,
        value: &T,
    ) -> Result<(), PublishError> {
        let topic = self.topic_for(suffix);
        let payload = serde_json::to_vec(value).map_err(|e| PublishError {
            topic: topic.clone(),
            message: e.to_string(),
        })?;
        self.sink
            .put(&topic, payload)
            .await
            .map_err(|e| PublishError {
                topic,
                message: e.to_string(),
            })
    }

    /// Release the sink connection.
    pub async fn close(mut self) -> poolsight_common::Result<()> {
        self.sink.close().await
    }
}

/// Statistics from publishing one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of successfully published readings.
    pub success: usize,
    /// Number of failed publishes.
    pub failed: usize,
}

impl PublishStats {
    /// Total number of attempted publishes.
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}
