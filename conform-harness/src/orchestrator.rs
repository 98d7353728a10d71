//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Test case sequencing.
//!
//! A test case runs in fixed phases:
//!
//! 1. configuration of the device and of the traffic generator;
//! 2. protocol start and convergence wait (neighbor resolution first);
//! 3. traffic, optionally with a configuration change while it flows;
//! 4. verification of every expectation;
//! 5. cleanup, which runs even when verification fails.
//!
//! Unmet convergence conditions are recorded as failures and the traffic
//! phase is skipped. Collaborator errors abort the case.

use std::sync::Arc;
use std::time::Duration;

use conform_model::Topology;
use futures::future;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::baseline::CounterBaseline;
use crate::config::HarnessConfig;
use crate::debug::Debug;
use crate::device::{Device, FlowCounters, TrafficGenerator};
use crate::error::{Error, Result};
use crate::path::ObservablePath;
use crate::session::{ConfigBatch, ConfigSession};
use crate::traffic::{
    StopCondition, TrafficController, TrafficReport, TrafficState,
};
use crate::verify::{
    self, CheckOutcome, FailureKind, VerificationAggregator,
    VerificationError, VerificationErrors,
};
use crate::watcher::{Backoff, StateWatcher};

/// Predicate over a sampled value, `None` meaning absent.
pub type Predicate = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// Check evaluated against the traffic report, if traffic ran.
pub type ReportCheck =
    Box<dyn FnOnce(Option<&TrafficReport>) -> CheckOutcome + Send>;

/// Collaborator whose state a path belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Target {
    Device,
    Generator,
}

/// Condition the control plane must reach before traffic starts.
#[derive(Clone)]
pub struct Convergence {
    pub target: Target,
    pub path: ObservablePath,
    pub description: String,
    pub timeout: Option<Duration>,
    pub hold: Option<Duration>,
    predicate: Predicate,
}

pub enum TrafficPlan {
    // Run traffic until the stop condition is met.
    Run(StopCondition),
    // Start traffic, wait for `flow` to receive `threshold` packets, apply
    // `batch` while traffic flows, then wait for every flow to drain.
    Reconfigure {
        flow: String,
        threshold: u64,
        timeout: Duration,
        batch: ConfigBatch,
        drain_timeout: Duration,
    },
}

pub enum Expectation {
    // Loss within tolerance; the configured default applies when unset.
    Loss {
        flow: String,
        tolerance_pct: Option<f64>,
    },
    // Exactly `expected_sent` packets sent, at most `max_dropped` lost.
    Delivered {
        flow: String,
        expected_sent: u64,
        max_dropped: u64,
    },
    // Exactly `expected_sent` packets sent, none received.
    Blocked { flow: String, expected_sent: u64 },
    Present { target: Target, path: ObservablePath },
    Absent { target: Target, path: ObservablePath },
    State {
        target: Target,
        path: ObservablePath,
        expected: Value,
    },
    // Device counter advanced by at least `min` since its previous check.
    CounterDelta {
        key: String,
        path: ObservablePath,
        min: u64,
    },
    Custom(ReportCheck),
}

pub struct TestCase {
    pub name: String,
    pub config: ConfigBatch,
    pub topology: Option<Topology>,
    pub convergence: Vec<Convergence>,
    pub traffic: Option<TrafficPlan>,
    pub expectations: Vec<Expectation>,
    pub cleanup: Option<ConfigBatch>,
}

#[derive(Debug)]
pub struct CaseOutcome {
    pub name: String,
    pub failures: VerificationErrors,
    pub report: Option<TrafficReport>,
    pub duration: Duration,
}

/// Runs test cases against one device and one traffic generator.
pub struct TestOrchestrator {
    config: HarnessConfig,
    session: ConfigSession,
    traffic: TrafficController,
    dut: StateWatcher,
    ate: StateWatcher,
    baseline: CounterBaseline,
}

// ===== impl Convergence =====

impl Convergence {
    pub fn new<F>(
        path: ObservablePath,
        description: impl Into<String>,
        predicate: F,
    ) -> Convergence
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Convergence {
            target: Target::Device,
            path,
            description: description.into(),
            timeout: None,
            hold: None,
            predicate: Arc::new(predicate),
        }
    }

    pub fn equals(path: ObservablePath, expected: impl Into<Value>) -> Self {
        let expected = expected.into();
        let description = format!("value {expected}");
        Convergence::new(path, description, move |value| {
            value == Some(&expected)
        })
    }

    pub fn present(path: ObservablePath) -> Convergence {
        Convergence::new(path, "presence", |value| value.is_some())
    }

    /// BGP session to `addr` in the default network instance reaches
    /// ESTABLISHED.
    pub fn bgp_established(addr: &std::net::IpAddr) -> Convergence {
        let path = ObservablePath::bgp_neighbor_state(
            conform_model::DEFAULT_NETWORK_INSTANCE,
            addr,
        );
        Convergence::equals(path, "ESTABLISHED")
    }

    pub fn on_generator(mut self) -> Self {
        self.target = Target::Generator;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Requires the predicate to keep holding for `hold`.
    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = Some(hold);
        self
    }
}

impl std::fmt::Debug for Convergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Convergence")
            .field("target", &self.target)
            .field("path", &self.path)
            .field("description", &self.description)
            .field("timeout", &self.timeout)
            .field("hold", &self.hold)
            .finish()
    }
}

// ===== impl Expectation =====

impl Expectation {
    pub fn loss(flow: impl Into<String>) -> Expectation {
        Expectation::Loss {
            flow: flow.into(),
            tolerance_pct: None,
        }
    }

    pub fn delivered(
        flow: impl Into<String>,
        expected_sent: u64,
        max_dropped: u64,
    ) -> Expectation {
        Expectation::Delivered {
            flow: flow.into(),
            expected_sent,
            max_dropped,
        }
    }

    pub fn blocked(flow: impl Into<String>, expected_sent: u64) -> Expectation {
        Expectation::Blocked {
            flow: flow.into(),
            expected_sent,
        }
    }

    pub fn present(path: ObservablePath) -> Expectation {
        Expectation::Present {
            target: Target::Device,
            path,
        }
    }

    pub fn absent(path: ObservablePath) -> Expectation {
        Expectation::Absent {
            target: Target::Device,
            path,
        }
    }

    pub fn state(path: ObservablePath, expected: impl Into<Value>) -> Self {
        Expectation::State {
            target: Target::Device,
            path,
            expected: expected.into(),
        }
    }

    pub fn counter_delta(
        key: impl Into<String>,
        path: ObservablePath,
        min: u64,
    ) -> Expectation {
        Expectation::CounterDelta {
            key: key.into(),
            path,
            min,
        }
    }

    pub fn custom<F>(check: F) -> Expectation
    where
        F: FnOnce(Option<&TrafficReport>) -> CheckOutcome + Send + 'static,
    {
        Expectation::Custom(Box::new(check))
    }
}

// ===== impl TestCase =====

impl TestCase {
    pub fn new(name: impl Into<String>) -> TestCase {
        TestCase {
            name: name.into(),
            config: ConfigBatch::new(),
            topology: None,
            convergence: Vec::new(),
            traffic: None,
            expectations: Vec::new(),
            cleanup: None,
        }
    }

    pub fn config(mut self, batch: ConfigBatch) -> Self {
        self.config = batch;
        self
    }

    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn converge(mut self, convergence: Convergence) -> Self {
        self.convergence.push(convergence);
        self
    }

    pub fn traffic(mut self, plan: TrafficPlan) -> Self {
        self.traffic = Some(plan);
        self
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    pub fn cleanup(mut self, batch: ConfigBatch) -> Self {
        self.cleanup = Some(batch);
        self
    }
}

// ===== impl CaseOutcome =====

impl CaseOutcome {
    pub fn is_pass(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> std::result::Result<Self, VerificationErrors> {
        if self.is_pass() {
            Ok(self)
        } else {
            Err(self.failures)
        }
    }
}

// ===== impl TestOrchestrator =====

impl TestOrchestrator {
    pub fn new<D, G>(
        device: Arc<D>,
        generator: Arc<G>,
        config: HarnessConfig,
    ) -> TestOrchestrator
    where
        D: Device + 'static,
        G: TrafficGenerator + 'static,
    {
        let backoff = Backoff::from(&config);
        TestOrchestrator {
            session: ConfigSession::new(device.clone()),
            traffic: TrafficController::new(generator.clone()),
            dut: StateWatcher::new(device, backoff),
            ate: StateWatcher::new(generator, backoff),
            baseline: CounterBaseline::new(),
            config,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn session(&self) -> &ConfigSession {
        &self.session
    }

    pub fn traffic(&mut self) -> &mut TrafficController {
        &mut self.traffic
    }

    pub fn device_watcher(&self) -> &StateWatcher {
        &self.dut
    }

    pub fn generator_watcher(&self) -> &StateWatcher {
        &self.ate
    }

    pub fn baseline(&self) -> &CounterBaseline {
        &self.baseline
    }

    /// Forgets every recorded counter reading, for a new test sequence.
    pub fn reset_baseline(&mut self) {
        self.baseline.reset();
    }

    /// Runs test cases in order. A collaborator error aborts the sequence.
    pub async fn run_all(
        &mut self,
        cases: impl IntoIterator<Item = TestCase>,
    ) -> Result<Vec<CaseOutcome>> {
        let mut outcomes = Vec::new();
        for case in cases {
            outcomes.push(self.run_case(case).await?);
        }
        Ok(outcomes)
    }

    pub async fn run_case(&mut self, case: TestCase) -> Result<CaseOutcome> {
        let start = Instant::now();
        let TestCase {
            name,
            config,
            topology,
            convergence,
            traffic,
            expectations,
            cleanup,
        } = case;
        Debug::CaseStart(&name).log();

        let result = self
            .run_phases(config, topology, convergence, traffic, expectations)
            .await;

        // Generator teardown and cleanup also run after a collaborator error,
        // but the first error is the one reported.
        let teardown = self.stop_generator().await;
        let cleanup = match &cleanup {
            Some(batch) => self.session.push(batch).await.map(|_| ()),
            None => Ok(()),
        };
        let (failures, report) = result?;
        teardown?;
        cleanup?;

        for failure in &failures {
            failure.log();
        }
        Debug::CaseEnd(&name, failures.len()).log();
        if failures.is_empty() {
            info!(case = %name, "test case passed");
        } else {
            warn!(case = %name, failures = %failures.len(), "test case failed");
        }
        Ok(CaseOutcome {
            name,
            failures,
            report,
            duration: start.elapsed(),
        })
    }

    async fn run_phases(
        &mut self,
        config: ConfigBatch,
        topology: Option<Topology>,
        convergence: Vec<Convergence>,
        traffic: Option<TrafficPlan>,
        expectations: Vec<Expectation>,
    ) -> Result<(VerificationErrors, Option<TrafficReport>)> {
        // Configuration.
        self.session.push(&config).await?;
        if let Some(topology) = topology {
            self.traffic.push_config(topology).await?;
        }
        if self.traffic.state() == TrafficState::Idle
            && self.traffic.topology().is_some()
        {
            self.traffic.start_protocols().await?;
        }

        // Convergence.
        let mut failures = self.await_neighbors().await?;
        failures.extend(self.await_convergence(&convergence).await?);
        let converged = failures.is_empty();

        // Traffic.
        let mut report = None;
        if let Some(plan) = traffic {
            if converged {
                self.traffic.confirm_convergence()?;
                failures.extend(self.run_traffic(plan).await?);
                report = Some(self.traffic.report().await?);
            } else {
                warn!("control plane did not converge, skipping traffic");
            }
        }

        // Verification.
        failures.extend(self.verify(expectations, report.as_ref()).await?);
        Ok((failures, report))
    }

    // Brings the generator back to idle, stopping traffic first if it is
    // still running.
    async fn stop_generator(&mut self) -> Result<()> {
        if self.traffic.state() == TrafficState::TrafficRunning {
            self.traffic.stop_traffic().await?;
        }
        if matches!(
            self.traffic.state(),
            TrafficState::ProtocolsStarted | TrafficState::TrafficStopped
        ) {
            self.traffic.stop_protocols().await?;
        }
        Ok(())
    }

    // Waits for every addressed generator port to resolve its gateway.
    async fn await_neighbors(&self) -> Result<VerificationErrors> {
        let mut failures = VerificationErrors::new();
        if !self.config.await_arp {
            return Ok(failures);
        }
        let paths = self
            .traffic
            .topology()
            .iter()
            .flat_map(|topology| topology.ports.iter())
            .filter(|port| port.address.is_some())
            .map(|port| ObservablePath::port_neighbor_resolved(&port.name))
            .collect::<Vec<_>>();
        if paths.is_empty() {
            return Ok(failures);
        }

        let timeout = self.config.arp_timeout;
        let mut results = self
            .ate
            .watch_all(paths.clone(), timeout, |resolved: Option<&bool>| {
                resolved == Some(&true)
            })
            .await?;
        for path in paths {
            if let Some(result) = results.remove(&path) {
                failures.record(result.verify(
                    &path,
                    timeout,
                    "neighbor resolution",
                ));
            }
        }
        Ok(failures)
    }

    // Waits for every convergence condition concurrently.
    async fn await_convergence(
        &self,
        convergence: &[Convergence],
    ) -> Result<VerificationErrors> {
        let waits = convergence.iter().map(|condition| {
            let watcher = self.watcher(condition.target);
            let timeout =
                condition.timeout.unwrap_or(self.config.convergence_timeout);
            async move {
                let predicate = &*condition.predicate;
                let result = match condition.hold {
                    Some(hold) => {
                        watcher
                            .watch_stable::<Value, _>(
                                &condition.path,
                                timeout,
                                hold,
                                predicate,
                            )
                            .await?
                    }
                    None => {
                        watcher
                            .watch::<Value, _>(
                                &condition.path,
                                timeout,
                                predicate,
                            )
                            .await?
                    }
                };
                Ok::<_, Error>(result.verify(
                    &condition.path,
                    timeout,
                    &condition.description,
                ))
            }
        });

        let mut failures = VerificationErrors::new();
        for outcome in future::try_join_all(waits).await? {
            failures.record(outcome);
        }
        Ok(failures)
    }

    async fn run_traffic(
        &mut self,
        plan: TrafficPlan,
    ) -> Result<VerificationErrors> {
        match plan {
            TrafficPlan::Run(condition) => {
                let report = self.traffic.run(&self.ate, condition).await?;
                Ok(report.failures)
            }
            TrafficPlan::Reconfigure {
                flow,
                threshold,
                timeout,
                batch,
                drain_timeout,
            } => {
                self.traffic.start_traffic().await?;
                let result = self
                    .reconfigure(
                        &flow,
                        threshold,
                        timeout,
                        &batch,
                        drain_timeout,
                    )
                    .await;
                self.traffic.stop_traffic().await?;
                result
            }
        }
    }

    // Applies a configuration batch while traffic flows.
    async fn reconfigure(
        &mut self,
        flow: &str,
        threshold: u64,
        timeout: Duration,
        batch: &ConfigBatch,
        drain_timeout: Duration,
    ) -> Result<VerificationErrors> {
        let mut failures = VerificationErrors::new();
        let received = self
            .traffic
            .wait_received(&self.ate, flow, threshold, timeout)
            .await?;
        failures.record(received.verify(
            &ObservablePath::flow_in_pkts(flow),
            timeout,
            &format!("at least {threshold} packets"),
        ));

        self.session.push(batch).await?;
        failures.extend(
            self.traffic.wait_drained(&self.ate, drain_timeout).await?,
        );
        Ok(failures)
    }

    async fn verify(
        &mut self,
        expectations: Vec<Expectation>,
        report: Option<&TrafficReport>,
    ) -> Result<VerificationErrors> {
        let dut = &self.dut;
        let ate = &self.ate;
        let baseline = &mut self.baseline;
        let timeout = self.config.state_timeout;
        let tolerance = self.config.loss_tolerance_pct;

        let pick = |target: Target| match target {
            Target::Device => dut,
            Target::Generator => ate,
        };

        let mut aggregator = VerificationAggregator::new();
        for expectation in expectations {
            match expectation {
                Expectation::Loss {
                    flow,
                    tolerance_pct,
                } => {
                    let tolerance = tolerance_pct.unwrap_or(tolerance);
                    aggregator.check(move || {
                        let counters = flow_counters(report, &flow)?;
                        verify::expect_loss_within(&flow, counters, tolerance)
                    });
                }
                Expectation::Delivered {
                    flow,
                    expected_sent,
                    max_dropped,
                } => {
                    let sent_flow = flow.clone();
                    aggregator.check(move || {
                        let counters = flow_counters(report, &sent_flow)?;
                        verify::expect_sent(&sent_flow, counters, expected_sent)
                    });
                    aggregator.check(move || {
                        let counters = flow_counters(report, &flow)?;
                        verify::expect_delivered(
                            &flow,
                            counters,
                            expected_sent,
                            max_dropped,
                        )
                    });
                }
                Expectation::Blocked {
                    flow,
                    expected_sent,
                } => {
                    let sent_flow = flow.clone();
                    aggregator.check(move || {
                        let counters = flow_counters(report, &sent_flow)?;
                        verify::expect_sent(&sent_flow, counters, expected_sent)
                    });
                    aggregator.check(move || {
                        let counters = flow_counters(report, &flow)?;
                        verify::expect_blocked(&flow, counters)
                    });
                }
                Expectation::Present { target, path } => {
                    let watcher = pick(target);
                    aggregator.check_async(async move {
                        let result = watcher
                            .watch::<Value, _>(&path, timeout, |value| {
                                value.is_some()
                            })
                            .await?;
                        Ok::<_, Error>(result
                            .verify(&path, timeout, "presence")
                            .map_err(|error| {
                                retag(error, FailureKind::Presence)
                            }))
                    });
                }
                Expectation::Absent { target, path } => {
                    let watcher = pick(target);
                    aggregator.check_async(async move {
                        let result = watcher
                            .watch::<Value, _>(&path, timeout, |value| {
                                value.is_none()
                            })
                            .await?;
                        Ok::<_, Error>(result
                            .verify(&path, timeout, "absence")
                            .map_err(|error| {
                                retag(error, FailureKind::Absence)
                            }))
                    });
                }
                Expectation::State {
                    target,
                    path,
                    expected,
                } => {
                    let watcher = pick(target);
                    aggregator.check_async(async move {
                        let result = watcher
                            .watch::<Value, _>(&path, timeout, |value| {
                                value == Some(&expected)
                            })
                            .await?;
                        let expectation = format!("value {expected}");
                        Ok::<_, Error>(result
                            .verify(&path, timeout, &expectation)
                            .map_err(|error| {
                                retag(error, FailureKind::Mismatch)
                            }))
                    });
                }
                Expectation::CounterDelta { key, path, min } => {
                    // Evaluated in place: every delta updates the baseline.
                    let current = dut.get::<u64>(&path).await?.unwrap_or(0);
                    aggregator.record(verify::expect_counter_delta(
                        baseline, &key, current, min,
                    ));
                }
                Expectation::Custom(check) => {
                    aggregator.check(move || check(report));
                }
            }
        }
        aggregator.run().await
    }

    fn watcher(&self, target: Target) -> &StateWatcher {
        match target {
            Target::Device => &self.dut,
            Target::Generator => &self.ate,
        }
    }
}

impl std::fmt::Debug for TestOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestOrchestrator")
            .field("session", &self.session)
            .field("traffic", &self.traffic)
            .field("baseline", &self.baseline)
            .finish()
    }
}

// ===== helper functions =====

fn flow_counters<'a>(
    report: Option<&'a TrafficReport>,
    flow: &str,
) -> std::result::Result<&'a FlowCounters, VerificationError> {
    report.and_then(|report| report.flow(flow)).ok_or_else(|| {
        VerificationError::new(
            FailureKind::Mismatch,
            format!("flow {flow}: no counters, traffic did not run"),
        )
    })
}

fn retag(error: VerificationError, kind: FailureKind) -> VerificationError {
    VerificationError { kind, ..error }
}
