//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Collaborator interfaces.
//!
//! The harness never talks to hardware directly. A device under test and a
//! traffic generator are reached through the traits below, which are
//! implemented by the transport layer in production and by the emulator in
//! tests.

use async_trait::async_trait;
use conform_model::{ConfigPath, Topology};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;
use crate::path::ObservablePath;

/// One observation of a path. `None` means the path was absent when sampled.
pub type Sample = Option<Value>;

/// Stream of samples pushed by a subscription. The first item must be the
/// current value of the path.
pub type SampleStream =
    BoxStream<'static, Result<Sample, TransportError>>;

/// Read access to operational state.
#[async_trait]
pub trait Telemetry: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Reads the current value of a path.
    async fn get(&self, path: &ObservablePath)
    -> Result<Sample, TransportError>;

    /// Opens a push subscription for a path.
    ///
    /// Returns `None` when the collaborator can only be polled.
    async fn subscribe(
        &self,
        _path: &ObservablePath,
    ) -> Result<Option<SampleStream>, TransportError> {
        Ok(None)
    }
}

/// Configuration access to the device under test.
#[async_trait]
pub trait Device: Telemetry {
    /// Reads the running configuration subtree rooted at `path`. Returns
    /// `None` when nothing is configured there.
    async fn get_config(
        &self,
        path: &ConfigPath,
    ) -> Result<Option<Value>, TransportError>;

    /// Replaces the whole subtree rooted at `path`.
    async fn replace(
        &self,
        path: &ConfigPath,
        value: Value,
    ) -> Result<(), TransportError>;

    /// Merges `value` into the subtree rooted at `path`.
    async fn update(
        &self,
        path: &ConfigPath,
        value: Value,
    ) -> Result<(), TransportError>;

    /// Removes the subtree rooted at `path`. Deleting an absent subtree is not
    /// an error.
    async fn delete(&self, path: &ConfigPath) -> Result<(), TransportError>;

    /// Applies vendor CLI text, for settings the schema cannot express.
    async fn push_cli(&self, _text: &str) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("cli configuration"))
    }
}

/// Control of the automated test equipment.
#[async_trait]
pub trait TrafficGenerator: Telemetry {
    /// Replaces the emulated topology. Counters of every flow are reset.
    async fn push_config(
        &self,
        topology: &Topology,
    ) -> Result<(), TransportError>;

    async fn start_protocols(&self) -> Result<(), TransportError>;

    async fn stop_protocols(&self) -> Result<(), TransportError>;

    async fn start_traffic(&self) -> Result<(), TransportError>;

    async fn stop_traffic(&self) -> Result<(), TransportError>;

    async fn flow_counters(
        &self,
        flow: &str,
    ) -> Result<FlowCounters, TransportError>;

    async fn port_counters(
        &self,
        port: &str,
    ) -> Result<PortCounters, TransportError>;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlowCounters {
    pub sent: u64,
    pub received: u64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PortCounters {
    pub out_frames: u64,
    pub in_frames: u64,
}

// ===== impl FlowCounters =====

impl FlowCounters {
    pub fn new(sent: u64, received: u64) -> FlowCounters {
        FlowCounters { sent, received }
    }

    /// Packets sent but not received. Duplicates never count as negative
    /// loss.
    pub fn lost(&self) -> u64 {
        self.sent.saturating_sub(self.received)
    }

    /// Loss percentage, undefined when nothing was sent.
    pub fn loss_pct(&self) -> Option<f64> {
        if self.sent == 0 {
            return None;
        }
        Some(self.lost() as f64 * 100.0 / self.sent as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_percentage() {
        assert_eq!(FlowCounters::new(10000, 9950).loss_pct(), Some(0.5));
        assert_eq!(FlowCounters::new(10000, 9800).loss_pct(), Some(2.0));
        assert_eq!(FlowCounters::new(100, 120).loss_pct(), Some(0.0));
        assert_eq!(FlowCounters::new(0, 0).loss_pct(), None);
    }
}
