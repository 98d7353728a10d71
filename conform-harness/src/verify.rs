//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Multi-failure verification.
//!
//! Checks registered on a [`VerificationAggregator`] all run, in
//! registration order, even after some of them fail. Their failures are
//! joined into a single [`VerificationErrors`] value, so one run reports
//! every problem with the test case at once.

use std::future::Future;

use futures::future::BoxFuture;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::baseline::CounterBaseline;
use crate::debug::Debug;
use crate::device::FlowCounters;
use crate::error::Result;

/// Outcome of a single check.
pub type CheckOutcome = std::result::Result<(), VerificationError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    // Observed value differs from the expected one.
    Mismatch,
    // Traffic loss above the accepted tolerance.
    Tolerance,
    // Predicate not satisfied before its deadline.
    Timeout,
    // Path expected to exist is absent.
    Presence,
    // Path expected to be gone still exists.
    Absence,
    // Counter did not advance by the expected amount.
    Counter,
}

/// A failed assertion.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct VerificationError {
    pub kind: FailureKind,
    pub description: String,
}

/// Every failure of one verification run, in check order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct VerificationErrors(Vec<VerificationError>);

/// Collects independent checks and runs them all.
#[derive(Default)]
pub struct VerificationAggregator<'a> {
    checks: Vec<Check<'a>>,
}

enum Check<'a> {
    Sync(Box<dyn FnOnce() -> CheckOutcome + Send + 'a>),
    Async(BoxFuture<'a, Result<CheckOutcome>>),
    Done(CheckOutcome),
}

// ===== impl FailureKind =====

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Mismatch => write!(f, "mismatch"),
            FailureKind::Tolerance => write!(f, "tolerance"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Presence => write!(f, "presence"),
            FailureKind::Absence => write!(f, "absence"),
            FailureKind::Counter => write!(f, "counter"),
        }
    }
}

// ===== impl VerificationError =====

impl VerificationError {
    pub fn new(
        kind: FailureKind,
        description: impl Into<String>,
    ) -> VerificationError {
        VerificationError {
            kind,
            description: description.into(),
        }
    }

    pub fn log(&self) {
        warn!(kind = %self.kind, "{}", self.description);
    }
}

impl std::fmt::Display for VerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description)
    }
}

impl std::error::Error for VerificationError {}

// ===== impl VerificationErrors =====

impl VerificationErrors {
    pub fn new() -> VerificationErrors {
        VerificationErrors::default()
    }

    pub fn push(&mut self, error: VerificationError) {
        self.0.push(error);
    }

    pub fn record(&mut self, outcome: CheckOutcome) {
        if let Err(error) = outcome {
            self.push(error);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VerificationError> {
        self.0.iter()
    }

    /// Returns `Ok(())` when no check failed.
    pub fn into_result(self) -> std::result::Result<(), VerificationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for VerificationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join("\n"))
    }
}

impl std::error::Error for VerificationErrors {}

impl Extend<VerificationError> for VerificationErrors {
    fn extend<I: IntoIterator<Item = VerificationError>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl FromIterator<VerificationError> for VerificationErrors {
    fn from_iter<I: IntoIterator<Item = VerificationError>>(
        iter: I,
    ) -> VerificationErrors {
        VerificationErrors(iter.into_iter().collect())
    }
}

impl IntoIterator for VerificationErrors {
    type Item = VerificationError;
    type IntoIter = std::vec::IntoIter<VerificationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a VerificationErrors {
    type Item = &'a VerificationError;
    type IntoIter = std::slice::Iter<'a, VerificationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ===== impl VerificationAggregator =====

impl<'a> VerificationAggregator<'a> {
    pub fn new() -> VerificationAggregator<'a> {
        VerificationAggregator::default()
    }

    /// Registers a synchronous check.
    pub fn check<F>(&mut self, check: F) -> &mut Self
    where
        F: FnOnce() -> CheckOutcome + Send + 'a,
    {
        self.checks.push(Check::Sync(Box::new(check)));
        self
    }

    /// Registers a check that needs to wait or read state. An `Err` returned
    /// by the future is fatal and aborts the run.
    pub fn check_async<Fut>(&mut self, check: Fut) -> &mut Self
    where
        Fut: Future<Output = Result<CheckOutcome>> + Send + 'a,
    {
        self.checks.push(Check::Async(Box::pin(check)));
        self
    }

    /// Registers the outcome of a check already evaluated by the caller.
    pub fn record(&mut self, outcome: CheckOutcome) -> &mut Self {
        self.checks.push(Check::Done(outcome));
        self
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Runs every check once, in registration order, and returns the
    /// collected failures (empty when all checks passed).
    pub async fn run(self) -> Result<VerificationErrors> {
        let mut errors = VerificationErrors::new();
        for (index, check) in self.checks.into_iter().enumerate() {
            let outcome = match check {
                Check::Sync(check) => check(),
                Check::Async(check) => check.await?,
                Check::Done(outcome) => outcome,
            };
            if let Err(error) = outcome {
                Debug::CheckFailed(index, &error).log();
                errors.push(error);
            }
        }
        Ok(errors)
    }
}

/// Runs synchronous checks, all of them, in order.
pub fn run_checks<I, F>(
    checks: I,
) -> std::result::Result<(), VerificationErrors>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> CheckOutcome,
{
    checks
        .into_iter()
        .filter_map(|check| check().err())
        .collect::<VerificationErrors>()
        .into_result()
}

// ===== global functions =====

/// Checks that an observed value equals the expected one.
pub fn expect_eq<T>(what: &str, actual: &T, expected: &T) -> CheckOutcome
where
    T: PartialEq + std::fmt::Debug + ?Sized,
{
    if actual == expected {
        return Ok(());
    }
    Err(VerificationError::new(
        FailureKind::Mismatch,
        format!("{what}: got {actual:?}, want {expected:?}"),
    ))
}

/// Checks that the loss of a flow stays within `tolerance_pct` percent.
///
/// A flow that sent nothing fails: its loss is undefined.
pub fn expect_loss_within(
    flow: &str,
    counters: &FlowCounters,
    tolerance_pct: f64,
) -> CheckOutcome {
    let Some(loss) = counters.loss_pct() else {
        return Err(VerificationError::new(
            FailureKind::Mismatch,
            format!("flow {flow}: no packets transmitted"),
        ));
    };
    if loss > tolerance_pct {
        return Err(VerificationError::new(
            FailureKind::Tolerance,
            format!(
                "flow {flow}: loss {loss:.2}% exceeds tolerance {tolerance_pct:.2}% (sent {}, received {})",
                counters.sent, counters.received
            ),
        ));
    }
    Ok(())
}

/// Checks that a flow sent exactly `expected_sent` packets.
pub fn expect_sent(
    flow: &str,
    counters: &FlowCounters,
    expected_sent: u64,
) -> CheckOutcome {
    if counters.sent != expected_sent {
        return Err(VerificationError::new(
            FailureKind::Mismatch,
            format!(
                "flow {flow}: sent {} packets, want {expected_sent}",
                counters.sent
            ),
        ));
    }
    Ok(())
}

/// Checks that a flow delivered all of its `expected_sent` packets except
/// at most `max_dropped`.
pub fn expect_delivered(
    flow: &str,
    counters: &FlowCounters,
    expected_sent: u64,
    max_dropped: u64,
) -> CheckOutcome {
    let min_received = expected_sent.saturating_sub(max_dropped);
    if counters.received < min_received {
        return Err(VerificationError::new(
            FailureKind::Tolerance,
            format!(
                "flow {flow}: received {} packets, want at least {min_received} (sent {}, {max_dropped} drops allowed)",
                counters.received, counters.sent
            ),
        ));
    }
    Ok(())
}

/// Checks that none of the packets of a flow were delivered.
pub fn expect_blocked(flow: &str, counters: &FlowCounters) -> CheckOutcome {
    if counters.received != 0 {
        return Err(VerificationError::new(
            FailureKind::Mismatch,
            format!(
                "flow {flow}: received {} packets, want 0 (sent {})",
                counters.received, counters.sent
            ),
        ));
    }
    Ok(())
}

/// Checks that a counter advanced by at least `min` since the previous
/// reading recorded in `baseline`, and records the current reading.
pub fn expect_counter_delta(
    baseline: &mut CounterBaseline,
    key: &str,
    current: u64,
    min: u64,
) -> CheckOutcome {
    let delta = baseline.delta(key, current);
    if delta < min {
        return Err(VerificationError::new(
            FailureKind::Counter,
            format!("counter {key}: advanced by {delta}, want at least {min}"),
        ));
    }
    Ok(())
}
