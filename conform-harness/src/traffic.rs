//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Traffic generator lifecycle.
//!
//! ```text
//!              push_config (any state but TrafficRunning)
//!                               |
//!                               v
//!    +--------------------> +------+
//!    |    stop_protocols    | Idle |
//!    |                      +------+
//!    |                         | start_protocols
//!    |                         v
//!    |              +------------------+
//!    +--------------| ProtocolsStarted |
//!    |              +------------------+
//!    |                         | start_traffic (once converged)
//!    |                         v
//!    |               +----------------+
//!    |               | TrafficRunning | <-----+
//!    |               +----------------+       |
//!    |                         | stop_traffic | start_traffic
//!    |                         v              |
//!    |               +----------------+       |
//!    +---------------| TrafficStopped | ------+
//!                    +----------------+
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use conform_model::Topology;
use serde::Serialize;
use tokio::time::{self, Instant};
use tracing::info;

use crate::debug::Debug;
use crate::device::{FlowCounters, PortCounters, TrafficGenerator};
use crate::error::{Error, Result};
use crate::path::ObservablePath;
use crate::verify::VerificationErrors;
use crate::watcher::{StateWatcher, WatchResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrafficState {
    Idle,
    ProtocolsStarted,
    TrafficRunning,
    TrafficStopped,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrafficOp {
    PushConfig,
    StartProtocols,
    ConfirmConvergence,
    StartTraffic,
    StopTraffic,
    StopProtocols,
    ReadCounters,
}

/// When a traffic run ends.
#[derive(Clone, Debug, PartialEq)]
pub enum StopCondition {
    // Stop after a fixed time.
    Duration(Duration),
    // Stop once every flow with a packet count has finished transmitting.
    Drained { timeout: Duration },
    // Stop once `flow` has received at least `packets`.
    Received {
        flow: String,
        packets: u64,
        timeout: Duration,
    },
}

/// Record of the current or last traffic run.
#[derive(Clone, Debug)]
pub struct TrafficRun {
    pub flows: Vec<String>,
    // Set when the run was started through `TrafficController::run`.
    pub condition: Option<StopCondition>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    started: Instant,
    elapsed: Option<Duration>,
}

/// Result of [`TrafficController::run`]. A stop condition that was not met
/// in time yields one timeout failure per unmet path.
#[derive(Clone, Debug)]
pub struct StopReport {
    pub condition: StopCondition,
    pub failures: VerificationErrors,
}

/// Counters of every flow and port after a traffic run.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrafficReport {
    pub flows: BTreeMap<String, FlowCounters>,
    pub ports: BTreeMap<String, PortCounters>,
}

/// Drives the traffic generator through its lifecycle.
pub struct TrafficController {
    generator: Arc<dyn TrafficGenerator>,
    state: TrafficState,
    topology: Option<Topology>,
    converged: bool,
    run: Option<TrafficRun>,
}

// ===== impl TrafficState =====

impl std::fmt::Display for TrafficState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrafficState::Idle => write!(f, "idle"),
            TrafficState::ProtocolsStarted => write!(f, "protocols started"),
            TrafficState::TrafficRunning => write!(f, "traffic running"),
            TrafficState::TrafficStopped => write!(f, "traffic stopped"),
        }
    }
}

// ===== impl TrafficOp =====

impl std::fmt::Display for TrafficOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrafficOp::PushConfig => write!(f, "push generator configuration"),
            TrafficOp::StartProtocols => write!(f, "start protocols"),
            TrafficOp::ConfirmConvergence => write!(f, "confirm convergence"),
            TrafficOp::StartTraffic => write!(f, "start traffic"),
            TrafficOp::StopTraffic => write!(f, "stop traffic"),
            TrafficOp::StopProtocols => write!(f, "stop protocols"),
            TrafficOp::ReadCounters => write!(f, "read counters"),
        }
    }
}

// ===== impl TrafficRun =====

impl TrafficRun {
    fn new(flows: Vec<String>) -> TrafficRun {
        TrafficRun {
            flows,
            condition: None,
            started_at: Utc::now(),
            stopped_at: None,
            started: Instant::now(),
            elapsed: None,
        }
    }

    fn stop(&mut self) {
        self.stopped_at = Some(Utc::now());
        self.elapsed = Some(self.started.elapsed());
    }

    /// Time the traffic ran for, up to now if it is still running.
    pub fn duration(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }
}

// ===== impl StopReport =====

impl StopReport {
    pub fn is_satisfied(&self) -> bool {
        self.failures.is_empty()
    }
}

// ===== impl TrafficReport =====

impl TrafficReport {
    pub fn flow(&self, name: &str) -> Option<&FlowCounters> {
        self.flows.get(name)
    }

    pub fn port(&self, name: &str) -> Option<&PortCounters> {
        self.ports.get(name)
    }

    // Log flow and port metrics using the tracing API.
    pub fn log(&self) {
        for (name, counters) in &self.flows {
            let loss = match counters.loss_pct() {
                Some(loss) => format!("{loss:.2}%"),
                None => "n/a".to_owned(),
            };
            info!(
                flow = %name,
                sent = %counters.sent,
                received = %counters.received,
                %loss,
                "flow metrics"
            );
        }
        for (name, counters) in &self.ports {
            info!(
                port = %name,
                out_frames = %counters.out_frames,
                in_frames = %counters.in_frames,
                "port metrics"
            );
        }
    }
}

// ===== impl TrafficController =====

impl TrafficController {
    pub fn new(generator: Arc<dyn TrafficGenerator>) -> TrafficController {
        TrafficController {
            generator,
            state: TrafficState::Idle,
            topology: None,
            converged: false,
            run: None,
        }
    }

    pub fn state(&self) -> TrafficState {
        self.state
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub fn last_run(&self) -> Option<&TrafficRun> {
        self.run.as_ref()
    }

    /// Pushes a new topology. Protocols are stopped as a side effect and flow
    /// counters start from zero.
    pub async fn push_config(&mut self, topology: Topology) -> Result<()> {
        if self.state == TrafficState::TrafficRunning {
            return Err(self.invalid(TrafficOp::PushConfig));
        }

        self.generator.push_config(&topology).await?;
        self.topology = Some(topology);
        self.converged = false;
        self.run = None;
        self.transition(TrafficState::Idle);
        Ok(())
    }

    pub async fn start_protocols(&mut self) -> Result<()> {
        if self.state != TrafficState::Idle {
            return Err(self.invalid(TrafficOp::StartProtocols));
        }

        self.generator.start_protocols().await?;
        self.converged = false;
        self.transition(TrafficState::ProtocolsStarted);
        Ok(())
    }

    /// Records that the control plane has converged, which unlocks
    /// [`TrafficController::start_traffic`].
    pub fn confirm_convergence(&mut self) -> Result<()> {
        if !self.protocols_up() {
            return Err(self.invalid(TrafficOp::ConfirmConvergence));
        }

        self.converged = true;
        Ok(())
    }

    pub async fn start_traffic(&mut self) -> Result<()> {
        if !self.protocols_up() {
            return Err(self.invalid(TrafficOp::StartTraffic));
        }
        if !self.converged {
            return Err(Error::NotConverged);
        }

        self.generator.start_traffic().await?;
        let flows = self
            .topology
            .iter()
            .flat_map(|topology| topology.flow_names())
            .map(ToOwned::to_owned)
            .collect();
        self.run = Some(TrafficRun::new(flows));
        self.transition(TrafficState::TrafficRunning);
        Ok(())
    }

    pub async fn stop_traffic(&mut self) -> Result<()> {
        if self.state != TrafficState::TrafficRunning {
            return Err(self.invalid(TrafficOp::StopTraffic));
        }

        self.generator.stop_traffic().await?;
        if let Some(run) = &mut self.run {
            run.stop();
        }
        self.transition(TrafficState::TrafficStopped);
        Ok(())
    }

    pub async fn stop_protocols(&mut self) -> Result<()> {
        if !self.protocols_up() {
            return Err(self.invalid(TrafficOp::StopProtocols));
        }

        self.generator.stop_protocols().await?;
        self.converged = false;
        self.transition(TrafficState::Idle);
        Ok(())
    }

    /// Starts traffic, waits for the stop condition and stops traffic.
    ///
    /// Traffic is stopped even when the condition is not met in time; the
    /// miss is reported in the returned [`StopReport`].
    pub async fn run(
        &mut self,
        watcher: &StateWatcher,
        condition: StopCondition,
    ) -> Result<StopReport> {
        self.start_traffic().await?;
        if let Some(run) = &mut self.run {
            run.condition = Some(condition.clone());
        }

        let result = match &condition {
            StopCondition::Duration(duration) => {
                time::sleep(*duration).await;
                Ok(VerificationErrors::new())
            }
            StopCondition::Drained { timeout } => {
                self.wait_drained(watcher, *timeout).await
            }
            StopCondition::Received {
                flow,
                packets,
                timeout,
            } => self
                .wait_received(watcher, flow, *packets, *timeout)
                .await
                .map(|result| {
                    let path = ObservablePath::flow_in_pkts(flow);
                    let expectation = format!("at least {packets} packets");
                    let mut failures = VerificationErrors::new();
                    let outcome = result.verify(&path, *timeout, &expectation);
                    failures.record(outcome);
                    failures
                }),
        };

        self.stop_traffic().await?;
        Ok(StopReport {
            condition,
            failures: result?,
        })
    }

    /// Waits until `flow` has received at least `packets`. Traffic keeps
    /// running.
    pub async fn wait_received(
        &self,
        watcher: &StateWatcher,
        flow: &str,
        packets: u64,
        timeout: Duration,
    ) -> Result<WatchResult<u64>> {
        self.check_flow(flow)?;
        let path = ObservablePath::flow_in_pkts(flow);
        watcher
            .watch(&path, timeout, |received: Option<&u64>| {
                received.is_some_and(|received| *received >= packets)
            })
            .await
    }

    /// Waits until every flow with a packet count stops transmitting. Flows
    /// that never finish yield one timeout failure each.
    pub async fn wait_drained(
        &self,
        watcher: &StateWatcher,
        timeout: Duration,
    ) -> Result<VerificationErrors> {
        let paths = self
            .topology
            .iter()
            .flat_map(|topology| topology.flows.iter())
            .filter(|flow| flow.packet_count.is_some())
            .map(|flow| ObservablePath::flow_transmit(&flow.name))
            .collect::<Vec<_>>();
        if paths.is_empty() {
            return Ok(VerificationErrors::new());
        }

        let mut results = watcher
            .watch_all(paths.clone(), timeout, |transmit: Option<&bool>| {
                transmit == Some(&false)
            })
            .await?;
        let mut failures = VerificationErrors::new();
        for path in paths {
            if let Some(result) = results.remove(&path) {
                failures.record(result.verify(
                    &path,
                    timeout,
                    "end of transmission",
                ));
            }
        }
        Ok(failures)
    }

    pub async fn read_counters(&self, flow: &str) -> Result<FlowCounters> {
        self.check_counters()?;
        self.check_flow(flow)?;
        let counters = self.generator.flow_counters(flow).await?;
        Ok(counters)
    }

    pub async fn port_counters(&self, port: &str) -> Result<PortCounters> {
        self.check_counters()?;
        let counters = self.generator.port_counters(port).await?;
        Ok(counters)
    }

    /// Reads the counters of every flow and port of the topology, and logs
    /// them.
    pub async fn report(&self) -> Result<TrafficReport> {
        self.check_counters()?;

        let mut report = TrafficReport::default();
        if let Some(topology) = &self.topology {
            for flow in &topology.flows {
                let counters = self.generator.flow_counters(&flow.name).await?;
                report.flows.insert(flow.name.clone(), counters);
            }
            for port in &topology.ports {
                let counters = self.generator.port_counters(&port.name).await?;
                report.ports.insert(port.name.clone(), counters);
            }
        }
        report.log();
        Ok(report)
    }

    fn protocols_up(&self) -> bool {
        matches!(
            self.state,
            TrafficState::ProtocolsStarted | TrafficState::TrafficStopped
        )
    }

    fn check_counters(&self) -> Result<()> {
        match self.state {
            TrafficState::TrafficRunning | TrafficState::TrafficStopped => {
                Ok(())
            }
            _ => Err(self.invalid(TrafficOp::ReadCounters)),
        }
    }

    fn check_flow(&self, flow: &str) -> Result<()> {
        let known = self
            .topology
            .as_ref()
            .is_some_and(|topology| topology.get_flow(flow).is_some());
        if !known {
            return Err(Error::UnknownFlow(flow.to_owned()));
        }
        Ok(())
    }

    fn invalid(&self, operation: TrafficOp) -> Error {
        Error::InvalidTransition(self.state, operation)
    }

    fn transition(&mut self, new_state: TrafficState) {
        if self.state != new_state {
            Debug::TrafficTransition(self.state, new_state).log();
            self.state = new_state;
        }
    }
}

impl std::fmt::Debug for TrafficController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficController")
            .field("generator", &self.generator.name())
            .field("state", &self.state)
            .field("converged", &self.converged)
            .finish()
    }
}
