//! In-memory transport and sink for exercising the bridge without hardware.
//!
//! Both doubles are cheap to clone and share their state, so a test can
//! hand one clone to the bridge and inspect the other afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use poolsight_common::Sink;
use tokio::sync::watch;

use crate::catalog::FunctionCode;
use crate::transport::{Transport, TransportError};

/// How a scripted register fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Device answers with an exception code.
    Exception,
    /// Device stays silent.
    Timeout,
    /// The link drops.
    ConnectionLost,
}

impl MockFailure {
    fn to_error(self) -> TransportError {
        match self {
            MockFailure::Exception => TransportError::Exception("IllegalDataAddress".to_string()),
            MockFailure::Timeout => TransportError::Timeout(Duration::from_secs(3)),
            MockFailure::ConnectionLost => {
                TransportError::ConnectionLost("broken pipe".to_string())
            }
        }
    }
}

/// One request seen by the mock bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusCall {
    pub function: FunctionCode,
    pub address: u16,
    pub slave_id: u8,
}

#[derive(Default)]
struct MockBus {
    words: HashMap<(FunctionCode, u16), u16>,
    bits: HashMap<u16, bool>,
    failures: HashMap<(FunctionCode, u16), MockFailure>,
    lost: bool,
    calls: Vec<BusCall>,
    closed: bool,
    stop_after: Option<(usize, watch::Sender<bool>)>,
}

/// Scripted register map.
///
/// Unscripted addresses answer with an exception. Once a
/// [`MockFailure::ConnectionLost`] register was hit, every later read fails
/// the same way.
#[derive(Clone, Default)]
pub struct MockTransport {
    bus: Arc<Mutex<MockBus>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A healthy chlorinator at any unit id.
    pub fn chlorinator() -> Self {
        Self::new()
            .with_holding(0x0000, 1)
            .with_holding(0x0001, 8)
            .with_input(0x0000, 650)
            .with_input(0x0001, 720)
            .with_input(0x0002, 3500)
            .with_input(0x0003, 0xFFF1)
            .with_input(0x0005, 80)
            .with_discrete(0x0000, false)
            .with_discrete(0x0001, true)
            .with_discrete(0x0002, true)
            .with_discrete(0x0003, false)
            .with_discrete(0x0030, false)
    }

    fn bus(&self) -> MutexGuard<'_, MockBus> {
        match self.bus.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn with_input(self, address: u16, word: u16) -> Self {
        self.bus()
            .words
            .insert((FunctionCode::InputRegister, address), word);
        self
    }

    pub fn with_holding(self, address: u16, word: u16) -> Self {
        self.bus()
            .words
            .insert((FunctionCode::HoldingRegister, address), word);
        self
    }

    pub fn with_discrete(self, address: u16, bit: bool) -> Self {
        self.bus().bits.insert(address, bit);
        self
    }

    /// Make reads of one register fail.
    pub fn failing(self, function: FunctionCode, address: u16, failure: MockFailure) -> Self {
        self.bus().failures.insert((function, address), failure);
        self
    }

    /// Flip `shutdown` to true once `reads` requests have been served.
    pub fn stop_after(self, reads: usize, shutdown: watch::Sender<bool>) -> Self {
        self.bus().stop_after = Some((reads, shutdown));
        self
    }

    /// Every request issued so far, in order.
    pub fn calls(&self) -> Vec<BusCall> {
        self.bus().calls.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.bus().closed
    }

    fn record(
        &self,
        function: FunctionCode,
        address: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<(), TransportError> {
        let mut bus = self.bus();
        bus.calls.push(BusCall {
            function,
            address,
            slave_id,
        });

        let served = bus.calls.len();
        if let Some((limit, shutdown)) = &bus.stop_after {
            if served >= *limit {
                let _ = shutdown.send(true);
            }
        }

        if bus.closed {
            return Err(TransportError::ConnectionLost("port closed".to_string()));
        }
        if bus.lost {
            return Err(MockFailure::ConnectionLost.to_error());
        }
        if count != 1 {
            return Err(TransportError::Exception("IllegalDataValue".to_string()));
        }
        if let Some(failure) = bus.failures.get(&(function, address)).copied() {
            if failure == MockFailure::ConnectionLost {
                bus.lost = true;
            }
            return Err(failure.to_error());
        }
        Ok(())
    }

    fn word(&self, function: FunctionCode, address: u16) -> Result<Vec<u16>, TransportError> {
        self.bus()
            .words
            .get(&(function, address))
            .map(|w| vec![*w])
            .ok_or_else(|| MockFailure::Exception.to_error())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<u16>, TransportError> {
        self.record(FunctionCode::InputRegister, address, count, slave_id)?;
        self.word(FunctionCode::InputRegister, address)
    }

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<bool>, TransportError> {
        self.record(FunctionCode::DiscreteInput, address, count, slave_id)?;
        self.bus()
            .bits
            .get(&address)
            .map(|b| vec![*b])
            .ok_or_else(|| MockFailure::Exception.to_error())
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
    ) -> Result<Vec<u16>, TransportError> {
        self.record(FunctionCode::HoldingRegister, address, count, slave_id)?;
        self.word(FunctionCode::HoldingRegister, address)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.bus().closed = true;
        Ok(())
    }
}

#[derive(Default)]
struct SinkLog {
    messages: Vec<(String, Vec<u8>)>,
    rejected_topics: HashSet<String>,
    closed: bool,
}

/// Sink that records every message it accepts.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, SinkLog> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Reject every message on `topic`.
    pub fn reject_topic(self, topic: impl Into<String>) -> Self {
        self.log().rejected_topics.insert(topic.into());
        self
    }

    /// Accepted messages with raw payloads.
    pub fn messages(&self) -> Vec<(String, Vec<u8>)> {
        self.log().messages.clone()
    }

    /// Accepted messages with payloads as text.
    pub fn published(&self) -> Vec<(String, String)> {
        self.log()
            .messages
            .iter()
            .map(|(t, p)| (t.clone(), String::from_utf8_lossy(p).into_owned()))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.log().closed
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn put(&self, topic: &str, payload: Vec<u8>) -> poolsight_common::Result<()> {
        let mut log = self.log();
        if log.closed {
            return Err(poolsight_common::Error::Rejected("sink closed".to_string()));
        }
        if log.rejected_topics.contains(topic) {
            return Err(poolsight_common::Error::Rejected(topic.to_string()));
        }
        log.messages.push((topic.to_string(), payload));
        Ok(())
    }

    async fn close(&mut self) -> poolsight_common::Result<()> {
        self.log().closed = true;
        Ok(())
    }
}
