//! Cyclic polling of the register catalog.
//!
//! Each cycle reads every sensor field, and every Nth cycle also every
//! status flag, strictly one request at a time. A failed read only drops
//! that field from the cycle's result.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, FieldKind, FunctionCode, RegisterSpec};
use crate::config::PollConfig;
use crate::decode::{DecodedReading, RawSample, RawValue, decode_sample};
use crate::error::{BridgeError, FieldError};
use crate::publisher::{PublishStats, TopicPublisher};
use crate::transport::{Transport, TransportError};

/// Readings gathered by one pass over a group of fields.
#[derive(Debug, Default)]
pub struct CycleResult {
    /// Index of the cycle that produced this result.
    pub index: u64,
    /// Successfully decoded readings, in catalog order.
    pub readings: Vec<DecodedReading>,
    /// Fields that could not be read this cycle.
    pub failures: Vec<FieldError>,
}

impl CycleResult {
    fn new(index: u64) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&DecodedReading> {
        self.readings.iter().find(|r| r.key == key)
    }
}

/// What one cycle did.
#[derive(Debug)]
pub struct CycleReport {
    pub index: u64,
    pub sensors: CycleResult,
    /// Present on status cycles only.
    pub status: Option<CycleResult>,
    pub published: PublishStats,
    /// Cancellation was observed before the cycle finished.
    pub cancelled: bool,
}

/// Cadence settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub status_every: u64,
    pub turnaround: Duration,
}

impl From<&PollConfig> for PollSettings {
    fn from(config: &PollConfig) -> Self {
        Self {
            interval: config.interval(),
            status_every: config.status_every.max(1),
            turnaround: config.turnaround(),
        }
    }
}

/// Running totals across cycles.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub cycles: u64,
    pub fields_read: u64,
    pub fields_failed: u64,
    pub published: u64,
    pub publish_failed: u64,
}

/// Whether cycle `index` includes the status-flag pass.
pub fn is_status_cycle(index: u64, every: u64) -> bool {
    index % every.max(1) == 0
}

/// Issue the transport read for one field.
pub async fn read_raw(
    transport: &mut dyn Transport,
    spec: &RegisterSpec,
) -> Result<RawSample, TransportError> {
    let raw = match spec.function {
        FunctionCode::InputRegister => transport
            .read_input_registers(spec.address, 1, spec.slave_id)
            .await?
            .first()
            .map(|w| RawValue::Word(*w)),
        FunctionCode::HoldingRegister => transport
            .read_holding_registers(spec.address, 1, spec.slave_id)
            .await?
            .first()
            .map(|w| RawValue::Word(*w)),
        FunctionCode::DiscreteInput => transport
            .read_discrete_inputs(spec.address, 1, spec.slave_id)
            .await?
            .first()
            .map(|b| RawValue::Bit(*b)),
    };

    let raw = raw.ok_or(TransportError::ShortResponse {
        expected: 1,
        got: 0,
    })?;

    Ok(RawSample {
        key: spec.key,
        raw,
        taken_at: Instant::now(),
    })
}

/// Read and decode one field, attributing any error to it.
pub async fn read_field(
    transport: &mut dyn Transport,
    spec: &RegisterSpec,
) -> Result<DecodedReading, FieldError> {
    let sample = read_raw(transport, spec).await.map_err(|source| FieldError {
        key: spec.key,
        function: spec.function.as_str(),
        address: spec.address,
        source,
    })?;
    Ok(decode_sample(spec, &sample))
}

fn is_cancelled(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Drives read cycles against a borrowed transport and publisher.
pub struct Poller<'a> {
    catalog: &'a Catalog,
    settings: PollSettings,
    transport: &'a mut dyn Transport,
    publisher: &'a TopicPublisher,
    cycle: u64,
    stats: PollStats,
}

impl<'a> Poller<'a> {
    pub fn new(
        catalog: &'a Catalog,
        settings: PollSettings,
        transport: &'a mut dyn Transport,
        publisher: &'a TopicPublisher,
    ) -> Self {
        Self {
            catalog,
            settings,
            transport,
            publisher,
            cycle: 0,
            stats: PollStats::default(),
        }
    }

    /// Index of the next cycle to run.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    /// Read every field of `kind`, in catalog order.
    ///
    /// Returns early, with what was read so far, once cancellation is seen.
    pub async fn poll_fields(
        &mut self,
        kind: FieldKind,
        shutdown: &watch::Receiver<bool>,
    ) -> (CycleResult, bool) {
        let mut result = CycleResult::new(self.cycle);
        let catalog = self.catalog;

        for (n, spec) in catalog.of_kind(kind).enumerate() {
            if is_cancelled(shutdown) {
                return (result, true);
            }
            if n > 0 && !self.settings.turnaround.is_zero() {
                tokio::time::sleep(self.settings.turnaround).await;
            }

            match read_field(&mut *self.transport, spec).await {
                Ok(reading) => {
                    match reading.value.status_text() {
                        Some(text) => debug!(key = spec.key, status = text, "{}", spec.label),
                        None => debug!(
                            key = spec.key,
                            value = %reading.value,
                            unit = spec.unit,
                            "{}",
                            spec.label
                        ),
                    }
                    self.stats.fields_read += 1;
                    result.readings.push(reading);
                }
                Err(e) => {
                    warn!(cycle = self.cycle, error = %e, "Field read failed");
                    self.stats.fields_failed += 1;
                    result.failures.push(e);
                }
            }
        }

        (result, false)
    }

    /// Run one cycle: sensors, status flags when due, then publish.
    ///
    /// A cancelled cycle publishes nothing. A lost connection is reported
    /// only after the cycle's readings were published.
    pub async fn run_cycle(
        &mut self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, BridgeError> {
        let index = self.cycle;
        debug!(cycle = index, "Reading cycle");

        let (sensors, cancelled) = self.poll_fields(FieldKind::Sensor, shutdown).await;
        let mut report = CycleReport {
            index,
            sensors,
            status: None,
            published: PublishStats::default(),
            cancelled,
        };

        if !report.cancelled && is_status_cycle(index, self.settings.status_every) {
            debug!(cycle = index, "Reading status flags");
            let (status, cancelled) = self.poll_fields(FieldKind::Status, shutdown).await;
            report.status = Some(status);
            report.cancelled = cancelled;
        }

        if report.cancelled {
            return Ok(report);
        }

        let mut published = self.publisher.publish_cycle(&report.sensors).await;
        if let Some(status) = &report.status {
            let status_stats = self.publisher.publish_cycle(status).await;
            published.success += status_stats.success;
            published.failed += status_stats.failed;
        }
        report.published = published;

        self.stats.cycles += 1;
        self.stats.published += published.success as u64;
        self.stats.publish_failed += published.failed as u64;
        self.cycle = self.cycle.wrapping_add(1);

        info!(
            cycle = index,
            read = report.sensors.readings.len()
                + report.status.as_ref().map_or(0, |s| s.readings.len()),
            failed = report.sensors.failures.len()
                + report.status.as_ref().map_or(0, |s| s.failures.len()),
            published = published.success,
            publish_failed = published.failed,
            "Cycle complete"
        );

        Ok(report)
    }

    /// Poll until cancelled. Fails only when the transport is lost.
    pub async fn run(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<PollStats, BridgeError> {
        info!(
            interval_secs = self.settings.interval.as_secs_f64(),
            status_every = self.settings.status_every,
            fields = self.catalog.len(),
            "Starting poll loop"
        );

        loop {
            let report = self.run_cycle(shutdown).await?;
            if report.cancelled {
                break;
            }

            if let Some(lost) = take_connection_lost(report) {
                return Err(BridgeError::TransportLost(lost));
            }

            if self.idle(shutdown).await {
                break;
            }
        }

        info!(cycles = self.stats.cycles, "Poll loop stopped");
        Ok(self.stats)
    }

    /// Sleep out the idle interval. Returns true when cancelled.
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.settings.interval) => is_cancelled(shutdown),
            changed = shutdown.changed() => changed.is_err() || is_cancelled(shutdown),
        }
    }
}

fn take_connection_lost(report: CycleReport) -> Option<TransportError> {
    report
        .sensors
        .failures
        .into_iter()
        .chain(report.status.into_iter().flat_map(|s| s.failures))
        .map(|f| f.source)
        .find(TransportError::is_connection_lost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_cadence() {
        let status: Vec<u64> = (0..25).filter(|i| is_status_cycle(*i, 10)).collect();
        assert_eq!(status, vec![0, 10, 20]);
        assert!(is_status_cycle(7, 1));
        assert!(is_status_cycle(0, 0));
    }

    #[test]
    fn test_settings_from_config() {
        let settings = PollSettings::from(&PollConfig::default());
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.status_every, 10);
        assert!(settings.turnaround.is_zero());
    }
}
