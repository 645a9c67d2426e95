//! Configuration for the chlorinator bridge.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use poolsight_common::{LoggingConfig, SinkConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] poolsight_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChlorinatorBridgeConfig {
    /// Field-bus device settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Poll cadence
    #[serde(default)]
    pub poll: PollConfig,

    /// Outbound naming and payload settings
    #[serde(default)]
    pub publish: PublishConfig,

    /// Telemetry sink (MQTT broker or Zenoh)
    #[serde(default)]
    pub sink: SinkConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the chlorinator controller on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name (used as telemetry source)
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Connection type and address
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_device_name() -> String {
    "chlorinator".to_string()
}

fn default_unit_id() -> u8 {
    8
}

fn default_timeout_ms() -> u64 {
    3000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            connection: ConnectionConfig::default(),
            unit_id: default_unit_id(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Connection configuration (RTU or TCP).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/serial0" or "COM1")
        #[serde(default = "default_serial_port")]
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
    /// Modbus TCP, for RS-485 to Ethernet gateways
    Tcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
}

fn default_serial_port() -> String {
    "/dev/serial0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_modbus_port() -> u16 {
    502
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig::Rtu {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
        }
    }
}

/// Poll cadence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Idle interval between cycles in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Read status flags every Nth cycle, starting with the first
    #[serde(default = "default_status_every")]
    pub status_every: u64,

    /// Pause between consecutive field reads in milliseconds
    #[serde(default)]
    pub turnaround_ms: u64,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_status_every() -> u64 {
    10
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            status_every: default_status_every(),
            turnaround_ms: 0,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn turnaround(&self) -> Duration {
        Duration::from_millis(self.turnaround_ms)
    }
}

/// Payload encoding for published readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Bare value text, e.g. `-2000` or `true`
    #[default]
    Plain,
    /// JSON-encoded telemetry point
    Json,
    /// CBOR-encoded telemetry point
    Cbor,
}

/// Outbound naming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Topic namespace; readings go to `<namespace>/<key>`
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub format: PayloadFormat,

    /// Publish bridge running/offline status to `<namespace>/@/status`
    #[serde(default = "default_status")]
    pub status: bool,
}

fn default_namespace() -> String {
    "pool".to_string()
}

fn default_status() -> bool {
    true
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            format: PayloadFormat::default(),
            status: default_status(),
        }
    }
}

impl ChlorinatorBridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ChlorinatorBridgeConfig = poolsight_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    #[cfg(test)]
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(poolsight_common::parse_config(content)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let device = &self.device;

        if device.name.is_empty() {
            return Err(ConfigError::Validation(
                "Device name cannot be empty".to_string(),
            ));
        }

        if !(1..=247).contains(&device.unit_id) {
            return Err(ConfigError::Validation(format!(
                "Device '{}': unit_id must be 1-247",
                device.name
            )));
        }

        if device.timeout_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "Device '{}': timeout_ms must be positive",
                device.name
            )));
        }

        if let ConnectionConfig::Rtu {
            parity,
            data_bits,
            stop_bits,
            ..
        } = &device.connection
        {
            match parity.to_lowercase().as_str() {
                "none" | "even" | "odd" => {}
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "Device '{}': invalid parity '{}' (use none, even, or odd)",
                        device.name, parity
                    )));
                }
            }
            if !(5..=8).contains(data_bits) {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': data_bits must be 5-8",
                    device.name
                )));
            }
            if !(1..=2).contains(stop_bits) {
                return Err(ConfigError::Validation(format!(
                    "Device '{}': stop_bits must be 1 or 2",
                    device.name
                )));
            }
        }

        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll.interval_secs must be at least 1".to_string(),
            ));
        }

        if self.poll.status_every == 0 {
            return Err(ConfigError::Validation(
                "poll.status_every must be at least 1".to_string(),
            ));
        }

        let namespace = self.publish.namespace.trim_matches('/');
        if namespace.is_empty() {
            return Err(ConfigError::Validation(
                "publish.namespace cannot be empty".to_string(),
            ));
        }
        if namespace.contains(['+', '#', '*', '$']) {
            return Err(ConfigError::Validation(format!(
                "publish.namespace '{}' must not contain wildcards",
                self.publish.namespace
            )));
        }

        self.sink
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolsight_common::{LogFormat, MqttConfig};

    #[test]
    fn test_defaults_match_reference_wiring() {
        let config = ChlorinatorBridgeConfig::parse("{}").unwrap();
        config.validate().unwrap();

        assert_eq!(config.device.unit_id, 8);
        assert_eq!(config.device.timeout_ms, 3000);
        match &config.device.connection {
            ConnectionConfig::Rtu {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => {
                assert_eq!(port, "/dev/serial0");
                assert_eq!(*baud_rate, 9600);
                assert_eq!(*data_bits, 8);
                assert_eq!(parity, "none");
                assert_eq!(*stop_bits, 1);
            }
            other => panic!("Expected RTU connection, got {:?}", other),
        }
        assert_eq!(config.poll.interval(), Duration::from_secs(30));
        assert_eq!(config.poll.status_every, 10);
        assert_eq!(config.publish.namespace, "pool");
        assert_eq!(config.publish.format, PayloadFormat::Plain);
        assert!(matches!(config.sink, SinkConfig::Mqtt(_)));
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            device: {
                name: "pool-house",
                connection: { type: "rtu", port: "/dev/ttyUSB0", baud_rate: 19200, parity: "even" },
                unit_id: 5,
            },
            poll: { interval_secs: 15, status_every: 4, turnaround_ms: 20 },
            publish: { namespace: "garden/pool", format: "json", status: false },
            sink: { type: "mqtt", host: "192.168.1.30", qos: 1 },
            logging: { level: "debug", format: "json" },
        }"#;

        let config = ChlorinatorBridgeConfig::parse(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.device.name, "pool-house");
        assert_eq!(config.device.unit_id, 5);
        assert_eq!(config.poll.turnaround(), Duration::from_millis(20));
        assert_eq!(config.publish.format, PayloadFormat::Json);
        assert!(!config.publish.status);
        assert_eq!(
            config.sink,
            SinkConfig::Mqtt(MqttConfig {
                host: "192.168.1.30".to_string(),
                qos: 1,
                ..MqttConfig::default()
            })
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_tcp_gateway() {
        let json = r#"{
            device: { connection: { type: "tcp", host: "192.168.1.40" } },
            sink: { type: "zenoh", mode: "client", connect: ["tcp/10.0.0.1:7447"] },
        }"#;

        let config = ChlorinatorBridgeConfig::parse(json).unwrap();
        config.validate().unwrap();

        if let ConnectionConfig::Tcp { host, port } = &config.device.connection {
            assert_eq!(host, "192.168.1.40");
            assert_eq!(*port, 502);
        } else {
            panic!("Expected TCP connection");
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            r#"{ device: { unit_id: 0 } }"#,
            r#"{ device: { unit_id: 248 } }"#,
            r#"{ device: { name: "" } }"#,
            r#"{ device: { connection: { type: "rtu", parity: "mark" } } }"#,
            r#"{ device: { connection: { type: "rtu", stop_bits: 3 } } }"#,
            r#"{ poll: { status_every: 0 } }"#,
            r#"{ poll: { interval_secs: 0 } }"#,
            r#"{ publish: { namespace: "/" } }"#,
            r#"{ publish: { namespace: "pool/#" } }"#,
            r#"{ sink: { type: "mqtt", qos: 5 } }"#,
        ];

        for case in cases {
            let config = ChlorinatorBridgeConfig::parse(case).unwrap();
            assert!(config.validate().is_err(), "expected rejection: {}", case);
        }
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = ChlorinatorBridgeConfig::parse(include_str!("../chlorinator.json5")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.device.unit_id, 8);
        assert_eq!(config.publish.namespace, "pool");
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ publish: {{ namespace: "spa" }} }}"#).unwrap();

        let config = ChlorinatorBridgeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.publish.namespace, "spa");

        assert!(matches!(
            ChlorinatorBridgeConfig::load_from_file("/nonexistent/chlorinator.json5"),
            Err(ConfigError::Load(poolsight_common::Error::Config(_)))
        ));
    }
}
