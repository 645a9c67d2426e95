use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Zenoh connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZenohConfig {
    /// Zenoh mode: "client", "peer", or "router".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Endpoints to connect to (for client mode).
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on (for peer/router mode).
    #[serde(default)]
    pub listen: Vec<String>,
}

fn default_mode() -> String {
    "peer".to_string()
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: Vec::new(),
            listen: Vec::new(),
        }
    }
}

/// MQTT broker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or IP address.
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker TCP port.
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Client identifier presented to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Quality of service for published messages (0, 1 or 2).
    #[serde(default)]
    pub qos: u8,

    /// Ask the broker to retain the last value per topic.
    #[serde(default)]
    pub retain: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "chlorinator_publisher".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            qos: 0,
            retain: false,
            username: None,
            password: None,
        }
    }
}

/// Telemetry sink selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Publish to an MQTT broker.
    Mqtt(MqttConfig),
    /// Publish into a Zenoh network.
    Zenoh(ZenohConfig),
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Mqtt(MqttConfig::default())
    }
}

impl SinkConfig {
    /// Validate sink-specific settings.
    pub fn validate(&self) -> Result<()> {
        match self {
            SinkConfig::Mqtt(mqtt) => {
                if mqtt.host.is_empty() {
                    return Err(Error::Config("MQTT host cannot be empty".to_string()));
                }
                if mqtt.qos > 2 {
                    return Err(Error::Config(format!(
                        "Invalid MQTT qos {} (use 0, 1 or 2)",
                        mqtt.qos
                    )));
                }
                if mqtt.username.is_some() != mqtt.password.is_some() {
                    return Err(Error::Config(
                        "MQTT username and password must be set together".to_string(),
                    ));
                }
            }
            SinkConfig::Zenoh(zenoh) => match zenoh.mode.as_str() {
                "client" | "peer" | "router" => {}
                other => {
                    return Err(Error::Config(format!(
                        "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
                        other
                    )));
                }
            },
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mqtt_sink() {
        let json5 = r#"
        {
            type: "mqtt",
            host: "192.168.1.30",
            qos: 1,
        }
        "#;

        let sink: SinkConfig = parse_config(json5).unwrap();
        let SinkConfig::Mqtt(mqtt) = &sink else {
            panic!("Expected MQTT sink");
        };
        assert_eq!(mqtt.host, "192.168.1.30");
        assert_eq!(mqtt.port, 1883);
        assert_eq!(mqtt.client_id, "chlorinator_publisher");
        assert_eq!(mqtt.keep_alive_secs, 60);
        assert_eq!(mqtt.qos, 1);
        sink.validate().unwrap();
    }

    #[test]
    fn test_parse_zenoh_sink() {
        let json5 = r#"
        {
            type: "zenoh",
            mode: "client",
            connect: ["tcp/localhost:7447"],
        }
        "#;

        let sink: SinkConfig = parse_config(json5).unwrap();
        assert_eq!(
            sink,
            SinkConfig::Zenoh(ZenohConfig {
                mode: "client".to_string(),
                connect: vec!["tcp/localhost:7447".to_string()],
                listen: Vec::new(),
            })
        );
    }

    #[test]
    fn test_sink_validation() {
        let bad_qos = SinkConfig::Mqtt(MqttConfig {
            qos: 3,
            ..MqttConfig::default()
        });
        assert!(bad_qos.validate().is_err());

        let half_credentials = SinkConfig::Mqtt(MqttConfig {
            username: Some("pool".to_string()),
            ..MqttConfig::default()
        });
        assert!(half_credentials.validate().is_err());

        let bad_mode = SinkConfig::Zenoh(ZenohConfig {
            mode: "mesh".to_string(),
            ..ZenohConfig::default()
        });
        assert!(bad_mode.validate().is_err());
    }

    #[test]
    fn test_logging_defaults() {
        let config: LoggingConfig = parse_config("{}").unwrap();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Text);

        let config: LoggingConfig = parse_config(r#"{ level: "debug", format: "json" }"#).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
    }
}
