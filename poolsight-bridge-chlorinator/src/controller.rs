//! Top-level lifecycle: probe, poll, tear down.
//!
//! ```text
//! Idle -> Probing -> Looping -> Stopped
//!            \___________________/^
//! ```
//!
//! The controller exclusively owns the transport and the sink for the whole
//! run and releases both on every exit path.

use std::future::Future;

use poolsight_common::Sink;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::config::ChlorinatorBridgeConfig;
use crate::error::{BridgeError, Result};
use crate::poller::{PollSettings, PollStats, Poller};
use crate::prober::{ConnectivityVerdict, Prober};
use crate::publisher::TopicPublisher;
use crate::status::BridgeStatus;
use crate::transport::Transport;

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Probing,
    Looping,
    Stopped,
}

/// Outcome of a run that ended by cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub verdict: ConnectivityVerdict,
    pub stats: PollStats,
}

pub struct Controller {
    config: ChlorinatorBridgeConfig,
    catalog: Catalog,
    state: BridgeState,
}

impl Controller {
    /// Controller for the chlorinator register map at the configured unit id.
    pub fn new(config: ChlorinatorBridgeConfig) -> Self {
        let catalog = Catalog::chlorinator(config.device.unit_id);
        Self {
            config,
            catalog,
            state: BridgeState::Idle,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    fn transition(&mut self, next: BridgeState) {
        info!(from = ?self.state, to = ?next, "Bridge state change");
        self.state = next;
    }

    /// Probe the device, then poll until `shutdown` flips to true.
    ///
    /// The sink is only opened once the probe succeeded.
    pub async fn run<F, Fut>(
        &mut self,
        mut transport: Box<dyn Transport>,
        open_sink: F,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = poolsight_common::Result<Box<dyn Sink>>>,
    {
        let unit_id = self.config.device.unit_id;

        self.transition(BridgeState::Probing);
        let verdict = Prober::new(unit_id).probe(&mut *transport).await;
        if !verdict.ok {
            error!(
                unit_id,
                "Connectivity probe failed: check the unit id, line settings and wiring"
            );
            self.teardown(transport, None).await;
            return Err(BridgeError::ProbeFailed { unit_id });
        }

        let sink = match open_sink().await {
            Ok(sink) => sink,
            Err(e) => {
                error!(error = %e, "Failed to open telemetry sink");
                self.teardown(transport, None).await;
                return Err(BridgeError::Sink(e));
            }
        };

        let publisher = TopicPublisher::new(
            sink,
            self.config.publish.namespace.clone(),
            self.config.publish.format,
            self.config.device.name.clone(),
            &self.catalog,
        );

        if self.config.publish.status {
            let status = BridgeStatus::running(&self.config.device.name).with_metadata(
                serde_json::json!({
                    "unit_id": unit_id,
                    "probe": verdict.probe_used,
                    "fields": self.catalog.iter().map(|s| s.key).collect::<Vec<_>>(),
                    "interval_secs": self.config.poll.interval_secs,
                }),
            );
            if let Err(e) = status.publish(&publisher).await {
                warn!(error = %e, "Failed to publish bridge status");
            }
        }

        self.transition(BridgeState::Looping);
        let settings = PollSettings::from(&self.config.poll);
        let result = {
            let mut poller = Poller::new(&self.catalog, settings, &mut *transport, &publisher);
            poller.run(&mut shutdown).await
        };

        if let Err(e) = &result {
            error!(error = %e, "Polling stopped");
        }

        self.teardown(transport, Some(publisher)).await;
        result.map(|stats| RunSummary { verdict, stats })
    }

    async fn teardown(
        &mut self,
        mut transport: Box<dyn Transport>,
        publisher: Option<TopicPublisher>,
    ) {
        if let Some(publisher) = publisher {
            if self.config.publish.status {
                if let Err(e) = BridgeStatus::offline(&self.config.device.name)
                    .publish(&publisher)
                    .await
                {
                    warn!(error = %e, "Failed to publish offline status");
                }
            }
            if let Err(e) = publisher.close().await {
                warn!(error = %e, "Error closing telemetry sink");
            }
        }

        if let Err(e) = transport.close().await {
            warn!(error = %e, "Error closing transport");
        }

        self.transition(BridgeState::Stopped);
    }
}
