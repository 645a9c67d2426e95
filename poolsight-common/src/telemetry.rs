use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single telemetry data point emitted by bridges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPoint {
    /// Unix epoch milliseconds when the measurement was taken.
    pub timestamp: i64,

    /// Device identifier (e.g., "chlorinator").
    pub source: String,

    /// Metric name (e.g., "orp", "no_flow").
    pub metric: String,

    /// The measured value.
    pub value: TelemetryValue,

    /// Engineering unit, when the metric has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Additional context labels (e.g., register address).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl TelemetryPoint {
    /// Create a new telemetry point with the current timestamp.
    pub fn new(
        source: impl Into<String>,
        metric: impl Into<String>,
        value: TelemetryValue,
    ) -> Self {
        Self {
            timestamp: current_timestamp_millis(),
            source: source.into(),
            metric: metric.into(),
            value,
            unit: None,
            labels: HashMap::new(),
        }
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a unit. Empty units are dropped.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        self.unit = (!unit.is_empty()).then_some(unit);
        self
    }

    /// Add a label to this telemetry point.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Typed telemetry value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TelemetryValue {
    /// Gauge (can go up or down).
    Gauge(f64),

    /// Boolean value.
    Boolean(bool),
}

impl From<f64> for TelemetryValue {
    fn from(v: f64) -> Self {
        TelemetryValue::Gauge(v)
    }
}

impl From<bool> for TelemetryValue {
    fn from(v: bool) -> Self {
        TelemetryValue::Boolean(v)
    }
}

impl std::fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryValue::Gauge(v) => write!(f, "{}", v),
            TelemetryValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_point_creation() {
        let point = TelemetryPoint::new("chlorinator", "orp", TelemetryValue::Gauge(-2000.0))
            .with_unit("mV")
            .with_label("address", "0");

        assert_eq!(point.source, "chlorinator");
        assert_eq!(point.metric, "orp");
        assert_eq!(point.unit.as_deref(), Some("mV"));
        assert_eq!(point.labels.get("address"), Some(&"0".to_string()));
        assert!(point.timestamp > 0);
    }

    #[test]
    fn test_empty_unit_is_dropped() {
        let point = TelemetryPoint::new("chlorinator", "no_flow", false.into()).with_unit("");
        assert!(point.unit.is_none());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(TelemetryValue::Gauge(-2000.0).to_string(), "-2000");
        assert_eq!(TelemetryValue::Gauge(7.5).to_string(), "7.5");
        assert_eq!(TelemetryValue::Gauge(-0.1).to_string(), "-0.1");
        assert_eq!(TelemetryValue::Boolean(true).to_string(), "true");
    }
}
