//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use async_trait::async_trait;
use conform_harness::{
    Device, ObservablePath, Sample, SampleStream, Telemetry, TransportError,
};
use conform_model::ConfigPath;
use serde_json::Value;

use crate::debug::Debug;
use crate::network::{NetworkState, Shared};

/// Emulated device under test.
///
/// Configuration is stored as pushed. Operational state is derived from it
/// and from what the traffic generator emulates on the other side of the
/// wire.
pub struct SimDevice {
    name: String,
    shared: Arc<Shared>,
}

// ===== impl SimDevice =====

impl SimDevice {
    pub(crate) fn new(name: String, shared: Arc<Shared>) -> SimDevice {
        SimDevice { name, shared }
    }

    // Applies a configuration change and lets the network react to it.
    fn configure<F>(
        &self,
        operation: &'static str,
        path: &ConfigPath,
        apply: F,
    ) -> Result<(), TransportError>
    where
        F: FnOnce(&mut NetworkState),
    {
        let mut state = self.shared.lock();
        state.config_request(&self.name, path)?;
        Debug::ConfigChange(&self.name, operation, path).log();
        apply(&mut *state);
        self.shared.reconcile(&mut state);
        drop(state);
        self.shared.changed();
        Ok(())
    }
}

#[async_trait]
impl Telemetry for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(
        &self,
        path: &ObservablePath,
    ) -> Result<Sample, TransportError> {
        let mut state = self.shared.lock();
        state.check_reachable(&self.name)?;
        Ok(state.device_state(path))
    }

    async fn subscribe(
        &self,
        path: &ObservablePath,
    ) -> Result<Option<SampleStream>, TransportError> {
        if !self.shared.config.subscriptions {
            return Ok(None);
        }
        self.shared.lock().check_reachable(&self.name)?;

        let name = self.name.clone();
        let stream = self.shared.samples(path, move |state, path| {
            state.check_reachable(&name)?;
            Ok(state.device_state(path))
        });
        Ok(Some(stream))
    }
}

#[async_trait]
impl Device for SimDevice {
    async fn get_config(
        &self,
        path: &ConfigPath,
    ) -> Result<Option<Value>, TransportError> {
        let state = self.shared.lock();
        state.check_reachable(&self.name)?;
        Ok(state.running_subtree(path))
    }

    async fn replace(
        &self,
        path: &ConfigPath,
        value: Value,
    ) -> Result<(), TransportError> {
        self.configure("replace", path, |state| state.replace(path, value))
    }

    async fn update(
        &self,
        path: &ConfigPath,
        value: Value,
    ) -> Result<(), TransportError> {
        self.configure("update", path, |state| state.update(path, value))
    }

    async fn delete(&self, path: &ConfigPath) -> Result<(), TransportError> {
        self.configure("delete", path, |state| state.delete(path))
    }

    async fn push_cli(&self, text: &str) -> Result<(), TransportError> {
        let mut state = self.shared.lock();
        state.check_reachable(&self.name)?;
        Debug::CliApply(&self.name, text.lines().count()).log();
        state.push_cli(text);
        Ok(())
    }
}

impl std::fmt::Debug for SimDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDevice").field("name", &self.name).finish()
    }
}
