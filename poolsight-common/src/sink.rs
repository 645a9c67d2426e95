//! Outbound telemetry sinks.
//!
//! A [`Sink`] is a long-lived connection to a message broker that accepts
//! `(topic, payload)` pairs. Delivery guarantees are those of the
//! underlying client; sinks never buffer or retry on their own.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tokio::task::JoinHandle;

use crate::config::{MqttConfig, SinkConfig, ZenohConfig};
use crate::error::{Error, Result};

/// A publish-only telemetry destination.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Publish one payload on a topic.
    async fn put(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Release the connection. Further `put` calls are not expected.
    async fn close(&mut self) -> Result<()>;
}

/// Open the sink described by `config`.
pub async fn open(config: &SinkConfig) -> Result<Box<dyn Sink>> {
    config.validate()?;
    match config {
        SinkConfig::Mqtt(mqtt) => Ok(Box::new(MqttSink::connect(mqtt)?)),
        SinkConfig::Zenoh(zenoh) => Ok(Box::new(ZenohSink::connect(zenoh).await?)),
    }
}

/// Map a numeric QoS level to the MQTT client's enum.
pub fn qos_from_u8(qos: u8) -> QoS {
    match qos {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

/// MQTT sink backed by `rumqttc`.
///
/// The client's event loop runs on its own task for the lifetime of the
/// sink and is stopped by [`Sink::close`].
pub struct MqttSink {
    client: AsyncClient,
    event_loop: Option<JoinHandle<()>>,
    qos: QoS,
    retain: bool,
}

impl MqttSink {
    /// Create the client and start driving its event loop.
    pub fn connect(config: &MqttConfig) -> Result<Self> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let host = config.host.clone();
        let port = config.port;
        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    tracing::warn!(host = %host, port, error = %e, "MQTT connection error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });

        tracing::info!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            "Connecting to MQTT broker"
        );

        Ok(Self {
            client,
            event_loop: Some(handle),
            qos: qos_from_u8(config.qos),
            retain: config.retain,
        })
    }
}

#[async_trait]
impl Sink for MqttSink {
    /// Queue a publish without waiting. A full request queue, e.g. while
    /// the broker is unreachable, is reported as an error.
    async fn put(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client.try_publish(topic, self.qos, self.retain, payload)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let result = self.client.try_disconnect();
        // Give the event loop a moment to flush the DISCONNECT packet.
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Some(handle) = self.event_loop.take() {
            handle.abort();
        }
        result.map_err(Error::from)
    }
}

/// Zenoh sink: topics are used as key expressions.
pub struct ZenohSink {
    session: zenoh::Session,
}

impl ZenohSink {
    /// Open a Zenoh session using the provided configuration.
    pub async fn connect(config: &ZenohConfig) -> Result<Self> {
        let mut zenoh_config = zenoh::Config::default();

        zenoh_config
            .insert_json5("mode", &format!("\"{}\"", config.mode))
            .map_err(|e| Error::Config(format!("Failed to set mode: {}", e)))?;

        if !config.connect.is_empty() {
            let endpoints_json = serde_json::to_string(&config.connect)?;
            zenoh_config
                .insert_json5("connect/endpoints", &endpoints_json)
                .map_err(|e| Error::Config(format!("Failed to set connect endpoints: {}", e)))?;
        }

        if !config.listen.is_empty() {
            let endpoints_json = serde_json::to_string(&config.listen)?;
            zenoh_config
                .insert_json5("listen/endpoints", &endpoints_json)
                .map_err(|e| Error::Config(format!("Failed to set listen endpoints: {}", e)))?;
        }

        tracing::info!(
            mode = %config.mode,
            connect = ?config.connect,
            listen = ?config.listen,
            "Connecting to Zenoh"
        );

        let session = zenoh::open(zenoh_config).await?;

        tracing::info!(zid = %session.zid(), "Connected to Zenoh");

        Ok(Self { session })
    }
}

#[async_trait]
impl Sink for ZenohSink {
    async fn put(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.session.put(topic, payload).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.session.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2), QoS::ExactlyOnce);
        assert_eq!(qos_from_u8(9), QoS::AtMostOnce);
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let config = SinkConfig::Mqtt(MqttConfig {
            qos: 7,
            ..MqttConfig::default()
        });
        assert!(matches!(open(&config).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_mqtt_put_does_not_block_without_broker() {
        // Reserve a port, then free it so nothing is listening there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut sink = MqttSink::connect(&MqttConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..MqttConfig::default()
        })
        .unwrap();

        let results = tokio::time::timeout(Duration::from_secs(5), async {
            let mut results = Vec::new();
            for n in 0..200 {
                results.push(sink.put("pool/orp", n.to_string().into_bytes()).await);
            }
            results
        })
        .await
        .expect("put must not wait for the broker");

        assert_eq!(results.len(), 200);
        let rejected = results.iter().filter(|r| r.is_err()).count();
        assert!(rejected > 0, "a full request queue must be reported");
        assert!(matches!(results.last(), Some(Err(Error::Mqtt(_)))));

        tokio::time::timeout(Duration::from_secs(5), sink.close())
            .await
            .expect("close must not wait for the broker")
            .ok();
    }
}
