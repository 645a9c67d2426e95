//! Field-bus transport.
//!
//! The [`Transport`] trait is the only way the bridge talks to the device.
//! [`ModbusTransport`] implements it over tokio-modbus for RTU serial lines
//! and Modbus TCP gateways.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio_modbus::client::{Context, Reader};
use tokio_modbus::prelude::*;
use tracing::{debug, info};

use crate::config::{ConnectionConfig, DeviceConfig};

/// Errors returned by a single transport call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("No response within {0:?}")]
    Timeout(Duration),
    #[error("Exception response: {0}")]
    Exception(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Short response: expected {expected} value(s), got {got}")]
    ShortResponse { expected: u16, got: usize },
}

impl TransportError {
    /// Whether the link itself is gone, as opposed to one request failing.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, TransportError::ConnectionLost(_))
    }

    /// Classify an I/O error raised by the client.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => TransportError::ConnectionLost(err.to_string()),
            io::ErrorKind::TimedOut => TransportError::Io(format!("timed out: {}", err)),
            _ => TransportError::Io(err.to_string()),
        }
    }
}

impl From<tokio_modbus::Error> for TransportError {
    fn from(err: tokio_modbus::Error) -> Self {
        match err {
            tokio_modbus::Error::Transport(io) => TransportError::from_io(&io),
            tokio_modbus::Error::Protocol(e) => TransportError::Protocol(e.to_string()),
        }
    }
}

/// Blocking request/response access to the device, one request at a time.
#[async_trait]
pub trait Transport: Send {
    /// Function 0x04.
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<u16>, TransportError>;

    /// Function 0x02.
    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<bool>, TransportError>;

    /// Function 0x03.
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<u16>, TransportError>;

    /// Release the underlying port or socket.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Resolve a gateway host (IP literal or hostname) to its first address.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TransportError::Connect(format!("Cannot resolve '{}': {}", host, e)))?
        .next()
        .ok_or_else(|| TransportError::Connect(format!("No address found for '{}'", host)))
}

/// Transport over a tokio-modbus client context.
pub struct ModbusTransport {
    ctx: Context,
    timeout: Duration,
}

impl ModbusTransport {
    /// Open the serial port or TCP socket described by the device config.
    pub async fn connect(device: &DeviceConfig) -> Result<Self, TransportError> {
        let timeout = Duration::from_millis(device.timeout_ms);
        let slave = Slave(device.unit_id);

        let ctx = match &device.connection {
            ConnectionConfig::Tcp { host, port } => {
                let addr = resolve(host, *port).await?;

                info!(
                    host = %host,
                    address = %addr,
                    unit_id = device.unit_id,
                    "Connecting to Modbus TCP gateway"
                );

                tokio::time::timeout(timeout, tcp::connect_slave(addr, slave))
                    .await
                    .map_err(|_| TransportError::Connect("Connection timeout".to_string()))?
                    .map_err(|e| TransportError::Connect(e.to_string()))?
            }
            ConnectionConfig::Rtu {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => {
                let parity = match parity.to_lowercase().as_str() {
                    "even" => tokio_serial::Parity::Even,
                    "odd" => tokio_serial::Parity::Odd,
                    _ => tokio_serial::Parity::None,
                };

                let stop_bits = match stop_bits {
                    2 => tokio_serial::StopBits::Two,
                    _ => tokio_serial::StopBits::One,
                };

                let data_bits = match data_bits {
                    5 => tokio_serial::DataBits::Five,
                    6 => tokio_serial::DataBits::Six,
                    7 => tokio_serial::DataBits::Seven,
                    _ => tokio_serial::DataBits::Eight,
                };

                info!(
                    port = %port,
                    baud_rate,
                    unit_id = device.unit_id,
                    "Opening Modbus RTU serial port"
                );

                let builder = tokio_serial::new(port, *baud_rate)
                    .parity(parity)
                    .stop_bits(stop_bits)
                    .data_bits(data_bits)
                    .timeout(timeout);

                let serial = tokio_serial::SerialStream::open(&builder)
                    .map_err(|e| TransportError::Connect(format!("Serial open failed: {}", e)))?;

                rtu::attach_slave(serial, slave)
            }
        };

        Ok(Self { ctx, timeout })
    }

    fn expect_len<T>(values: Vec<T>, count: u16) -> Result<Vec<T>, TransportError> {
        if values.len() < usize::from(count) {
            return Err(TransportError::ShortResponse {
                expected: count,
                got: values.len(),
            });
        }
        Ok(values)
    }
}

/// Await a client call with the per-request timeout and flatten its layered result.
async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, TransportError>
where
    F: std::future::Future<Output = tokio_modbus::Result<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| TransportError::Timeout(timeout))??
        .map_err(|code| TransportError::Exception(format!("{:?}", code)))
}

#[async_trait]
impl Transport for ModbusTransport {
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<u16>, TransportError> {
        self.ctx.set_slave(Slave(slave_id));
        let words = bounded(self.timeout, self.ctx.read_input_registers(address, count)).await?;
        debug!(address, count, slave_id, values = ?words, "Read input registers");
        Self::expect_len(words, count)
    }

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<bool>, TransportError> {
        self.ctx.set_slave(Slave(slave_id));
        let bits = bounded(self.timeout, self.ctx.read_discrete_inputs(address, count)).await?;
        debug!(address, count, slave_id, values = ?bits, "Read discrete inputs");
        Self::expect_len(bits, count)
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<u16>, TransportError> {
        self.ctx.set_slave(Slave(slave_id));
        let words = bounded(self.timeout, self.ctx.read_holding_registers(address, count)).await?;
        debug!(address, count, slave_id, values = ?words, "Read holding registers");
        Self::expect_len(words, count)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.ctx
            .disconnect()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let lost = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        assert!(TransportError::from_io(&lost).is_connection_lost());

        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(TransportError::from_io(&eof).is_connection_lost());

        let other = io::Error::other("crc mismatch");
        assert!(!TransportError::from_io(&other).is_connection_lost());
    }

    #[test]
    fn test_expect_len() {
        assert_eq!(ModbusTransport::expect_len(vec![1u16], 1).unwrap(), vec![1]);
        assert!(matches!(
            ModbusTransport::expect_len(Vec::<u16>::new(), 1),
            Err(TransportError::ShortResponse {
                expected: 1,
                got: 0
            })
        ));
    }

    #[test]
    fn test_timeout_is_not_fatal() {
        assert!(!TransportError::Timeout(Duration::from_secs(3)).is_connection_lost());
        assert!(!TransportError::Exception("IllegalDataAddress".to_string()).is_connection_lost());
    }

    #[tokio::test]
    async fn test_resolve_ip_and_hostname() {
        let addr = resolve("192.168.1.40", 502).await.unwrap();
        assert_eq!(addr, "192.168.1.40:502".parse::<SocketAddr>().unwrap());

        let local = resolve("localhost", 1502).await.unwrap();
        assert!(local.ip().is_loopback());
        assert_eq!(local.port(), 1502);
    }
}
