//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use async_trait::async_trait;
use conform_harness::{
    FlowCounters, ObservablePath, PortCounters, Sample, SampleStream,
    Telemetry, TrafficGenerator, TransportError,
};
use conform_model::Topology;

use crate::debug::Debug;
use crate::network::Shared;
use crate::tasks;

/// Emulated traffic generator.
///
/// Flows are generated at their configured rate in fixed ticks, and stop on
/// their own once their packet count is reached.
pub struct SimGenerator {
    name: String,
    shared: Arc<Shared>,
}

// ===== impl SimGenerator =====

impl SimGenerator {
    pub(crate) fn new(name: String, shared: Arc<Shared>) -> SimGenerator {
        SimGenerator { name, shared }
    }
}

#[async_trait]
impl Telemetry for SimGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(
        &self,
        path: &ObservablePath,
    ) -> Result<Sample, TransportError> {
        Ok(self.shared.lock().generator_state(path))
    }

    async fn subscribe(
        &self,
        path: &ObservablePath,
    ) -> Result<Option<SampleStream>, TransportError> {
        if !self.shared.config.subscriptions {
            return Ok(None);
        }

        let stream = self
            .shared
            .samples(path, |state, path| Ok(state.generator_state(path)));
        Ok(Some(stream))
    }
}

#[async_trait]
impl TrafficGenerator for SimGenerator {
    async fn push_config(
        &self,
        topology: &Topology,
    ) -> Result<(), TransportError> {
        Debug::TopologyPush(
            &self.name,
            topology.ports.len(),
            topology.flows.len(),
        )
        .log();

        let mut state = self.shared.lock();
        state.push_topology(topology.clone());
        self.shared.reconcile(&mut state);
        drop(state);
        self.shared.changed();
        Ok(())
    }

    async fn start_protocols(&self) -> Result<(), TransportError> {
        let mut state = self.shared.lock();
        if !state.has_topology() {
            return Err(TransportError::Rejected(
                "no topology configured".to_owned(),
            ));
        }
        Debug::ProtocolsChange(&self.name, true).log();
        state.set_protocols(true);
        self.shared.reconcile(&mut state);
        drop(state);
        self.shared.changed();
        Ok(())
    }

    async fn stop_protocols(&self) -> Result<(), TransportError> {
        Debug::ProtocolsChange(&self.name, false).log();
        let mut state = self.shared.lock();
        state.set_protocols(false);
        self.shared.reconcile(&mut state);
        drop(state);
        self.shared.changed();
        Ok(())
    }

    async fn start_traffic(&self) -> Result<(), TransportError> {
        let mut state = self.shared.lock();
        if !state.protocols() {
            return Err(TransportError::Rejected(
                "protocols are not running".to_owned(),
            ));
        }
        Debug::TrafficChange(&self.name, true).log();
        let task = tasks::traffic_tick(
            self.shared.config.tick,
            Arc::downgrade(&self.shared),
        );
        state.start_traffic(task);
        drop(state);
        self.shared.changed();
        Ok(())
    }

    async fn stop_traffic(&self) -> Result<(), TransportError> {
        Debug::TrafficChange(&self.name, false).log();
        self.shared.lock().stop_traffic();
        self.shared.changed();
        Ok(())
    }

    async fn flow_counters(
        &self,
        flow: &str,
    ) -> Result<FlowCounters, TransportError> {
        self.shared
            .lock()
            .flow_counters(flow)
            .ok_or_else(|| {
                TransportError::Rejected(format!("unknown flow {flow}"))
            })
    }

    async fn port_counters(
        &self,
        port: &str,
    ) -> Result<PortCounters, TransportError> {
        self.shared
            .lock()
            .port_counters(port)
            .ok_or_else(|| {
                TransportError::Rejected(format!("unknown port {port}"))
            })
    }
}

impl std::fmt::Debug for SimGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimGenerator")
            .field("name", &self.name)
            .finish()
    }
}
