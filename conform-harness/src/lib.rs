//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Convergence-wait and traffic-verification harness for network
//! conformance tests.
//!
//! A test case pushes configuration to a device under test through a
//! [`ConfigSession`], waits for the control plane to converge with a
//! [`StateWatcher`], drives traffic through a [`TrafficController`] and
//! collects every failed assertion with a [`VerificationAggregator`]. The
//! [`TestOrchestrator`] sequences those phases.

#![warn(rust_2018_idioms)]

pub mod baseline;
pub mod config;
mod debug;
pub mod device;
pub mod error;
pub mod orchestrator;
pub mod path;
pub mod session;
pub mod traffic;
pub mod verify;
pub mod watcher;

pub use crate::baseline::CounterBaseline;
pub use crate::config::HarnessConfig;
pub use crate::device::{
    Device, FlowCounters, PortCounters, Sample, SampleStream, Telemetry,
    TrafficGenerator,
};
pub use crate::error::{Error, Result, TransportError};
pub use crate::orchestrator::{
    CaseOutcome, Convergence, Expectation, Target, TestCase, TestOrchestrator,
    TrafficPlan,
};
pub use crate::path::ObservablePath;
pub use crate::session::{ConfigBatch, ConfigOp, ConfigSession, PushOutcome};
pub use crate::traffic::{
    StopCondition, StopReport, TrafficController, TrafficOp, TrafficReport,
    TrafficState,
};
pub use crate::verify::{
    CheckOutcome, FailureKind, VerificationAggregator, VerificationError,
    VerificationErrors,
};
pub use crate::watcher::{Backoff, StateWatcher, WatchResult};
