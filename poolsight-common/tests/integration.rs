//! Integration tests for poolsight-common library.

use std::io::Write;

use poolsight_common::{
    Format, LoggingConfig, SinkConfig, TelemetryPoint, TelemetryValue, decode, encode,
    load_config,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SiteConfig {
    #[serde(default)]
    sink: SinkConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            // broker on the home-automation host
            sink: {{ type: "mqtt", host: "192.168.1.30", port: 1884 }},
            logging: {{ level: "debug" }},
        }}"#
    )
    .unwrap();

    let config: SiteConfig = load_config(file.path()).unwrap();
    match config.sink {
        SinkConfig::Mqtt(mqtt) => {
            assert_eq!(mqtt.host, "192.168.1.30");
            assert_eq!(mqtt.port, 1884);
        }
        other => panic!("Expected MQTT sink, got {:?}", other),
    }
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_load_config_defaults_to_local_mqtt() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{}}").unwrap();

    let config: SiteConfig = load_config(file.path()).unwrap();
    match config.sink {
        SinkConfig::Mqtt(mqtt) => {
            assert_eq!(mqtt.host, "localhost");
            assert_eq!(mqtt.port, 1883);
        }
        other => panic!("Expected MQTT sink, got {:?}", other),
    }
}

#[test]
fn test_load_config_missing_file() {
    let result: poolsight_common::Result<SiteConfig> = load_config("/nonexistent/pool.json5");
    let err = result.unwrap_err().to_string();
    assert!(err.contains("/nonexistent/pool.json5"));
}

#[test]
fn test_telemetry_point_workflow() {
    let point = TelemetryPoint::new("chlorinator", "pool_temp", TelemetryValue::Gauge(-1.5))
        .with_unit("°C")
        .with_label("address", "3")
        .with_timestamp(1_700_000_000_000);

    for format in [Format::Json, Format::Cbor] {
        let bytes = encode(&point, format).expect("encode failed");
        let decoded: TelemetryPoint = decode(&bytes, format).expect("decode failed");
        assert_eq!(decoded.timestamp, 1_700_000_000_000);
        assert_eq!(decoded.metric, "pool_temp");
        assert_eq!(decoded.value, TelemetryValue::Gauge(-1.5));
        assert_eq!(decoded.unit.as_deref(), Some("°C"));
        assert_eq!(decoded.labels.get("address"), Some(&"3".to_string()));
    }
}
