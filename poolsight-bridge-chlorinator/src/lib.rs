//! PoolSight bridge for salt-water chlorinator controllers.
//!
//! This bridge polls the controller over Modbus (RTU serial, or TCP through
//! a gateway), decodes its registers into engineering units and status
//! flags, and publishes them to an MQTT broker or a Zenoh network.
//!
//! # Topics
//!
//! ```text
//! <namespace>/<key>          e.g. pool/orp, pool/ph, pool/no_flow
//! <namespace>/@/status       bridge running/offline status
//! ```

pub mod catalog;
pub mod config;
pub mod controller;
pub mod decode;
pub mod error;
pub mod mock;
pub mod poller;
pub mod prober;
pub mod publisher;
pub mod status;
pub mod transport;

pub use catalog::{Catalog, FieldKind, FunctionCode, RegisterSpec};
pub use controller::{BridgeState, Controller, RunSummary};
pub use decode::{DecodeRule, DecodedReading, Value};
pub use error::{BridgeError, Result};
pub use transport::{ModbusTransport, Transport, TransportError};
