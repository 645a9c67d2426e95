//! One-shot connectivity check run before polling starts.
//!
//! Firmware revisions differ in which holding registers they expose, so
//! two registers are tried in turn. Any response without a protocol error
//! proves that the bus address and line settings are right.

use std::fmt;

use tracing::{info, warn};

use crate::transport::{Transport, TransportError};

/// Holding register that mirrors the configured bus address.
pub const DEVICE_ADDRESS_REGISTER: u16 = 0x0001;

/// Holding register that holds the operating mode.
pub const OPERATING_MODE_REGISTER: u16 = 0x0000;

/// Outcome of the pre-flight probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityVerdict {
    pub ok: bool,
    /// Name of the probe that succeeded, or "none".
    pub probe_used: &'static str,
}

/// Controller operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Shutdown,
    Auto,
    Boost,
    FactoryTest,
    Unknown(u16),
}

impl From<u16> for OperatingMode {
    fn from(raw: u16) -> Self {
        match raw {
            0 => OperatingMode::Shutdown,
            1 => OperatingMode::Auto,
            2 => OperatingMode::Boost,
            3 => OperatingMode::FactoryTest,
            other => OperatingMode::Unknown(other),
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::Shutdown => write!(f, "Shutdown"),
            OperatingMode::Auto => write!(f, "Auto mode"),
            OperatingMode::Boost => write!(f, "Boost mode"),
            OperatingMode::FactoryTest => write!(f, "Factory test mode"),
            OperatingMode::Unknown(raw) => write!(f, "Unknown ({})", raw),
        }
    }
}

/// Checks that the device answers on the expected unit id.
pub struct Prober {
    unit_id: u8,
}

impl Prober {
    pub fn new(unit_id: u8) -> Self {
        Self { unit_id }
    }

    /// Try the device-address register, then the operating-mode register.
    pub async fn probe(&self, transport: &mut dyn Transport) -> ConnectivityVerdict {
        match self.read_one(transport, DEVICE_ADDRESS_REGISTER).await {
            Ok(reported) => {
                if reported != u16::from(self.unit_id) {
                    warn!(
                        reported,
                        configured = self.unit_id,
                        "Device address register disagrees with configured unit id"
                    );
                }
                info!(address = reported, "Probe succeeded: read device address setting");
                return ConnectivityVerdict {
                    ok: true,
                    probe_used: "device_address",
                };
            }
            Err(e) => {
                warn!(error = %e, "Probe: failed to read device address register");
            }
        }

        match self.read_one(transport, OPERATING_MODE_REGISTER).await {
            Ok(raw) => {
                let mode = OperatingMode::from(raw);
                info!(mode = %mode, "Probe succeeded: read operating mode");
                ConnectivityVerdict {
                    ok: true,
                    probe_used: "operating_mode",
                }
            }
            Err(e) => {
                warn!(error = %e, "Probe: failed to read operating mode register");
                ConnectivityVerdict {
                    ok: false,
                    probe_used: "none",
                }
            }
        }
    }

    async fn read_one(
        &self,
        transport: &mut dyn Transport,
        address: u16,
    ) -> Result<u16, TransportError> {
        let words = transport
            .read_holding_registers(address, 1, self.unit_id)
            .await?;
        words
            .first()
            .copied()
            .ok_or(TransportError::ShortResponse {
                expected: 1,
                got: 0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FunctionCode;
    use crate::mock::{MockFailure, MockTransport};

    #[tokio::test]
    async fn test_device_address_probe() {
        let mut transport = MockTransport::new().with_holding(DEVICE_ADDRESS_REGISTER, 8);
        let verdict = Prober::new(8).probe(&mut transport).await;
        assert_eq!(
            verdict,
            ConnectivityVerdict {
                ok: true,
                probe_used: "device_address"
            }
        );
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_address_mismatch_still_confirms_link() {
        let mut transport = MockTransport::new().with_holding(DEVICE_ADDRESS_REGISTER, 3);
        let verdict = Prober::new(8).probe(&mut transport).await;
        assert!(verdict.ok);
        assert_eq!(transport.calls()[0].slave_id, 8);
    }

    #[tokio::test]
    async fn test_operating_mode_fallback() {
        let mut transport = MockTransport::new()
            .with_holding(OPERATING_MODE_REGISTER, 2)
            .failing(
                FunctionCode::HoldingRegister,
                DEVICE_ADDRESS_REGISTER,
                MockFailure::Timeout,
            );
        let verdict = Prober::new(8).probe(&mut transport).await;
        assert!(verdict.ok);
        assert_eq!(verdict.probe_used, "operating_mode");
    }

    #[tokio::test]
    async fn test_both_probes_fail() {
        let mut transport = MockTransport::new();
        let verdict = Prober::new(8).probe(&mut transport).await;
        assert!(!verdict.ok);
        assert_eq!(verdict.probe_used, "none");
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn test_operating_mode() {
        assert_eq!(OperatingMode::from(0), OperatingMode::Shutdown);
        assert_eq!(OperatingMode::from(2), OperatingMode::Boost);
        assert_eq!(OperatingMode::from(3).to_string(), "Factory test mode");
        assert_eq!(OperatingMode::from(9).to_string(), "Unknown (9)");
    }
}
