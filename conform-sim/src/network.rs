//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use conform_harness::session::merge_json;
use conform_harness::{
    FlowCounters, ObservablePath, PortCounters, Sample, SampleStream,
    TransportError,
};
use conform_model::{
    AclAction, AclSet, Bgp, ConfigPath, DEFAULT_NETWORK_INSTANCE, FlowSpec,
    Interface, Neighbor, Topology,
};
use conform_utils::task::{IntervalTask, TimeoutTask};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::debug::Debug;
use crate::tasks;

/// Emulator settings.
#[derive(Clone, Debug)]
pub struct SimConfig {
    // Time a BGP session takes to reach ESTABLISHED once it can.
    pub bgp_delay: Duration,
    // Traffic generation granularity.
    pub tick: Duration,
    // Fraction of forwarded packets lost on the wire.
    pub loss_ratio: f64,
    // Offer push subscriptions on top of polling.
    pub subscriptions: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    Idle,
    Active,
    Established,
}

/// Emulated device under test and traffic generator sharing one wire.
///
/// Each generator port connects to the device interface holding the port's
/// gateway address.
#[derive(Clone)]
pub struct SimNetwork {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) config: SimConfig,
    state: Mutex<NetworkState>,
    version: watch::Sender<u64>,
}

#[derive(Default)]
pub(crate) struct NetworkState {
    // Device under test.
    running: BTreeMap<ConfigPath, Value>,
    sessions: BTreeMap<IpAddr, SessionState>,
    bgp_timers: BTreeMap<IpAddr, TimeoutTask>,
    acl_counters: BTreeMap<(String, String, u32), u64>,
    cli: Vec<String>,
    unreachable: bool,
    rejected: Vec<ConfigPath>,
    config_rpcs: usize,
    gets: usize,
    // Traffic generator.
    topology: Option<Topology>,
    protocols: bool,
    resolved: BTreeSet<String>,
    flows: BTreeMap<String, FlowState>,
    ports: BTreeMap<String, PortCounters>,
    traffic: Option<IntervalTask>,
    loss_ratio: f64,
}

#[derive(Debug, Default)]
struct FlowState {
    counters: FlowCounters,
    transmit: bool,
    // Fractional packets carried over to the next tick.
    credit: f64,
    // Packets that made it to the receiving port, and how many of those were
    // lost on the wire.
    forwarded: u64,
    lost: u64,
}

// ===== impl SimConfig =====

impl Default for SimConfig {
    fn default() -> SimConfig {
        SimConfig {
            bgp_delay: Duration::from_secs(3),
            tick: Duration::from_millis(10),
            loss_ratio: 0.0,
            subscriptions: false,
        }
    }
}

// ===== impl SessionState =====

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "IDLE"),
            SessionState::Active => write!(f, "ACTIVE"),
            SessionState::Established => write!(f, "ESTABLISHED"),
        }
    }
}

// ===== impl SimNetwork =====

impl SimNetwork {
    pub fn new(config: SimConfig) -> SimNetwork {
        let (version, _) = watch::channel(0);
        let state = NetworkState {
            loss_ratio: config.loss_ratio,
            ..Default::default()
        };
        SimNetwork {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
                version,
            }),
        }
    }

    pub fn device(&self, name: impl Into<String>) -> Arc<crate::SimDevice> {
        Arc::new(crate::SimDevice::new(name.into(), self.shared.clone()))
    }

    pub fn generator(
        &self,
        name: impl Into<String>,
    ) -> Arc<crate::SimGenerator> {
        Arc::new(crate::SimGenerator::new(name.into(), self.shared.clone()))
    }

    /// Makes every device request fail as if the device were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        Debug::DeviceReachability(!unreachable).log();
        self.shared.lock().unreachable = unreachable;
    }

    /// Makes the device reject configuration changes at or under `path`.
    pub fn reject(&self, path: ConfigPath) {
        self.shared.lock().rejected.push(path);
    }

    pub fn set_loss_ratio(&self, ratio: f64) {
        self.shared.lock().loss_ratio = ratio.clamp(0.0, 1.0);
    }

    /// Drops a BGP session back to ACTIVE. It re-establishes after the
    /// configured delay if nothing else prevents it.
    pub fn flap_session(&self, addr: IpAddr) {
        let mut state = self.shared.lock();
        if state.sessions.contains_key(&addr) {
            state.set_session(addr, SessionState::Active);
            state.bgp_timers.remove(&addr);
            self.shared.reconcile(&mut state);
        }
        drop(state);
        self.shared.changed();
    }

    /// Number of configuration requests that reached the device.
    pub fn config_rpcs(&self) -> usize {
        self.shared.lock().config_rpcs
    }

    /// Number of state reads served by the device and the generator.
    pub fn gets(&self) -> usize {
        self.shared.lock().gets
    }

    pub fn running(&self, path: &ConfigPath) -> Option<Value> {
        self.shared.lock().running.get(path).cloned()
    }

    pub fn cli(&self) -> Vec<String> {
        self.shared.lock().cli.clone()
    }

    pub fn session_state(&self, addr: &IpAddr) -> Option<SessionState> {
        self.shared.lock().sessions.get(addr).copied()
    }
}

impl std::fmt::Debug for SimNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimNetwork")
            .field("config", &self.shared.config)
            .finish()
    }
}

// ===== impl Shared =====

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Wakes up subscribers.
    pub(crate) fn changed(&self) {
        self.version.send_modify(|version| *version += 1);
    }

    // Returns a stream yielding the current value of a path, and then a new
    // value every time the network changes.
    pub(crate) fn samples<F>(
        self: &Arc<Self>,
        path: &ObservablePath,
        lookup: F,
    ) -> SampleStream
    where
        F: Fn(
                &mut NetworkState,
                &ObservablePath,
            ) -> Result<Sample, TransportError>
            + Send
            + 'static,
    {
        let shared = self.clone();
        let path = path.clone();
        WatchStream::new(self.version.subscribe())
            .map(move |_| lookup(&mut *shared.lock(), &path))
            .boxed()
    }

    // Brings neighbor resolution and BGP sessions in line with the current
    // configuration of both ends.
    pub(crate) fn reconcile(self: &Arc<Self>, state: &mut NetworkState) {
        // Neighbor resolution.
        let resolved = match (&state.topology, state.protocols) {
            (Some(topology), true) => topology
                .ports
                .iter()
                .filter(|port| state.facing_interface(&port.name).is_some())
                .map(|port| port.name.clone())
                .collect(),
            _ => BTreeSet::new(),
        };
        for port in resolved.difference(&state.resolved) {
            Debug::NeighborResolved(port).log();
        }
        state.resolved = resolved;

        // BGP sessions.
        let neighbors = state
            .config::<Bgp>(&ConfigPath::bgp(DEFAULT_NETWORK_INSTANCE))
            .map(|bgp| bgp.neighbors)
            .unwrap_or_default();
        let configured =
            |addr: &IpAddr| neighbors.iter().any(|nbr| nbr.address == *addr);
        state.sessions.retain(|addr, _| configured(addr));
        state.bgp_timers.retain(|addr, _| configured(addr));
        for nbr in &neighbors {
            let addr = nbr.address;
            if !state.peer_ready(nbr) {
                state.bgp_timers.remove(&addr);
                state.set_session(addr, SessionState::Idle);
                continue;
            }
            if state.sessions.get(&addr) == Some(&SessionState::Established) {
                continue;
            }
            state.set_session(addr, SessionState::Active);
            if !state.bgp_timers.contains_key(&addr) {
                let task = tasks::bgp_establish(
                    self.config.bgp_delay,
                    Arc::downgrade(self),
                    addr,
                );
                state.bgp_timers.insert(addr, task);
            }
        }
    }

    // Establishes a pending BGP session whose timer expired.
    pub(crate) fn establish(&self, addr: IpAddr) {
        let mut state = self.lock();
        if state.bgp_timers.remove(&addr).is_none() {
            return;
        }
        state.set_session(addr, SessionState::Established);
        drop(state);
        self.changed();
    }

    // Generates one tick worth of traffic. Returns whether any flow is still
    // transmitting.
    pub(crate) fn tick(&self) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let flows = state
            .topology
            .as_ref()
            .map(|topology| topology.flows.clone())
            .unwrap_or_default();
        let elapsed = self.config.tick.as_secs_f64();

        let mut active = false;
        for spec in &flows {
            let Some(flow) = state.flows.get_mut(&spec.name) else {
                continue;
            };
            if !flow.transmit {
                continue;
            }

            flow.credit += spec.rate_pps as f64 * elapsed;
            let mut packets = flow.credit.floor() as u64;
            flow.credit -= packets as f64;
            if let Some(count) = spec.packet_count {
                packets = packets.min(count.saturating_sub(flow.counters.sent));
            }
            let reached = state.forward(spec, packets);
            let received = state.apply_loss(&spec.name, reached);

            let Some(flow) = state.flows.get_mut(&spec.name) else {
                continue;
            };
            flow.counters.sent += packets;
            flow.counters.received += received;
            if spec.packet_count == Some(flow.counters.sent) {
                flow.transmit = false;
                Debug::FlowDone(&spec.name, &flow.counters).log();
            }
            active |= flow.transmit;

            let tx = state.ports.entry(spec.tx_port.clone()).or_default();
            tx.out_frames += packets;
            let rx = state.ports.entry(spec.rx_port.clone()).or_default();
            rx.in_frames += received;
        }
        drop(guard);
        self.changed();
        active
    }
}

// ===== impl NetworkState =====

impl NetworkState {
    pub(crate) fn check_reachable(
        &self,
        name: &str,
    ) -> Result<(), TransportError> {
        if self.unreachable {
            return Err(TransportError::Unreachable(name.to_owned()));
        }
        Ok(())
    }

    // Validates and accounts a configuration request.
    pub(crate) fn config_request(
        &mut self,
        name: &str,
        path: &ConfigPath,
    ) -> Result<(), TransportError> {
        self.check_reachable(name)?;
        if self.rejected.iter().any(|rejected| rejected.contains(path)) {
            return Err(TransportError::Rejected(format!(
                "{path}: invalid configuration"
            )));
        }
        self.config_rpcs += 1;
        Ok(())
    }

    pub(crate) fn replace(&mut self, path: &ConfigPath, value: Value) {
        self.running.retain(|other, _| !path.contains(other));
        self.running.insert(path.clone(), value);
    }

    // Renders the subtree rooted at `path`. Entries stored below it are
    // merged in under their relative path.
    pub(crate) fn running_subtree(&self, path: &ConfigPath) -> Option<Value> {
        let mut subtree = self.running.get(path).cloned();
        let nested = self
            .running
            .iter()
            .filter(|(other, _)| *other != path && path.contains(other));
        for (other, value) in nested {
            let key = other
                .as_str()
                .strip_prefix(path.as_str())
                .unwrap_or_default()
                .trim_start_matches('/');
            let subtree = subtree.get_or_insert(Value::Null);
            merge_json(subtree, json!({ key: value }));
        }
        subtree
    }

    pub(crate) fn update(&mut self, path: &ConfigPath, value: Value) {
        let current = self.running.entry(path.clone()).or_insert(Value::Null);
        merge_json(current, value);
    }

    pub(crate) fn delete(&mut self, path: &ConfigPath) {
        self.running.retain(|other, _| !path.contains(other));
    }

    pub(crate) fn push_cli(&mut self, text: &str) {
        self.cli.extend(text.lines().map(str::to_owned));
    }

    pub(crate) fn device_state(
        &mut self,
        path: &ObservablePath,
    ) -> Option<Value> {
        self.gets += 1;
        let config_path = ConfigPath::new(path.as_str());
        if let Some(value) = self.running.get(&config_path) {
            return Some(value.clone());
        }

        let suffix = path.as_str().rsplit("/state/").next()?;
        match suffix {
            "session-state" => {
                let addr = path.key("neighbor-address")?.parse().ok()?;
                self.sessions.get(&addr).map(|state| json!(state))
            }
            "matched-packets" => {
                let name = path.key("name")?;
                let acl_type = path.key("type")?;
                let seq = path.key("sequence-id")?.parse::<u32>().ok()?;
                let configured = self.acls().iter().any(|acl| {
                    acl.name == name
                        && acl.acl_type.to_string() == acl_type
                        && acl.entries.iter().any(|e| e.sequence_id == seq)
                });
                let key = (name.to_owned(), acl_type.to_owned(), seq);
                match self.acl_counters.get(&key) {
                    Some(count) => Some(json!(count)),
                    None if configured => Some(json!(0)),
                    None => None,
                }
            }
            "oper-status" => {
                let name = path.key("name")?;
                let intf = self
                    .config::<Interface>(&ConfigPath::interface(name))?;
                let status = if intf.enabled { "UP" } else { "DOWN" };
                Some(json!(status))
            }
            _ => None,
        }
    }

    pub(crate) fn generator_state(
        &mut self,
        path: &ObservablePath,
    ) -> Option<Value> {
        self.gets += 1;
        let topology = self.topology.as_ref()?;
        let suffix = path.as_str().rsplit("/state/").next()?;
        if suffix == "neighbor-resolved" {
            let port = topology.get_port(path.key("name")?)?;
            return Some(json!(self.resolved.contains(&port.name)));
        }

        let flow = topology.get_flow(path.key("name")?)?;
        let state = self.flows.get(&flow.name);
        let counters = state.map(|state| state.counters).unwrap_or_default();
        let transmit = state.is_some_and(|state| state.transmit);
        match suffix {
            "counters/out-pkts" => Some(json!(counters.sent)),
            "counters/in-pkts" => Some(json!(counters.received)),
            "transmit" => Some(json!(transmit)),
            _ => None,
        }
    }

    pub(crate) fn push_topology(&mut self, topology: Topology) {
        self.traffic = None;
        self.protocols = false;
        self.flows = topology
            .flows
            .iter()
            .map(|flow| (flow.name.clone(), FlowState::default()))
            .collect();
        self.ports = topology
            .ports
            .iter()
            .map(|port| (port.name.clone(), PortCounters::default()))
            .collect();
        self.topology = Some(topology);
    }

    pub(crate) fn has_topology(&self) -> bool {
        self.topology.is_some()
    }

    pub(crate) fn protocols(&self) -> bool {
        self.protocols
    }

    pub(crate) fn set_protocols(&mut self, protocols: bool) {
        self.protocols = protocols;
        if !protocols {
            self.stop_traffic();
        }
    }

    // Restarts every flow from zero.
    pub(crate) fn start_traffic(&mut self, task: IntervalTask) {
        for flow in self.flows.values_mut() {
            *flow = FlowState {
                transmit: true,
                ..Default::default()
            };
        }
        for port in self.ports.values_mut() {
            *port = PortCounters::default();
        }
        self.traffic = Some(task);
    }

    pub(crate) fn stop_traffic(&mut self) {
        for flow in self.flows.values_mut() {
            flow.transmit = false;
        }
        self.traffic = None;
    }

    pub(crate) fn flow_counters(&self, flow: &str) -> Option<FlowCounters> {
        let topology = self.topology.as_ref()?;
        topology.get_flow(flow)?;
        let counters = self.flows.get(flow).map(|state| state.counters);
        Some(counters.unwrap_or_default())
    }

    pub(crate) fn port_counters(&self, port: &str) -> Option<PortCounters> {
        self.ports.get(port).copied()
    }

    fn set_session(&mut self, addr: IpAddr, new_state: SessionState) {
        let old_state = self.sessions.insert(addr, new_state);
        if old_state != Some(new_state) {
            Debug::SessionTransition(&addr, old_state, new_state).log();
        }
    }

    fn config<T: DeserializeOwned>(&self, path: &ConfigPath) -> Option<T> {
        let value = self.running.get(path)?;
        serde_json::from_value(value.clone()).ok()
    }

    fn interfaces(&self) -> Vec<Interface> {
        self.blocks("/interfaces/")
    }

    fn acls(&self) -> Vec<AclSet> {
        self.blocks("/acl/")
    }

    // Every well-formed configuration block under `prefix`.
    fn blocks<T: DeserializeOwned>(&self, prefix: &str) -> Vec<T> {
        self.running
            .iter()
            .filter(|(path, _)| path.as_str().starts_with(prefix))
            .filter_map(|(_, value)| serde_json::from_value(value.clone()).ok())
            .collect()
    }

    // Returns the name of the enabled device interface holding the gateway
    // address of a generator port.
    fn facing_interface(&self, port: &str) -> Option<String> {
        let port = self.topology.as_ref()?.get_port(port)?;
        let gateway = port.gateway?;
        self.interfaces()
            .into_iter()
            .find(|intf| {
                intf.enabled
                    && intf
                        .ipv4
                        .iter()
                        .any(|net| IpAddr::V4(net.ip()) == gateway)
            })
            .map(|intf| intf.name)
    }

    // A session can come up when its neighbor is an emulated BGP speaker
    // with the expected AS, behind a resolved port.
    fn peer_ready(&self, nbr: &Neighbor) -> bool {
        if !nbr.enabled || !self.protocols {
            return false;
        }
        let Some(topology) = &self.topology else {
            return false;
        };
        topology.ports.iter().any(|port| {
            port.address.is_some_and(|addr| addr.ip() == nbr.address)
                && port
                    .bgp_peer
                    .as_ref()
                    .is_some_and(|peer| peer.asn == nbr.peer_as)
                && self.resolved.contains(&port.name)
        })
    }

    // Carries `packets` of a flow through the device. Returns how many reach
    // the receiving port.
    fn forward(&mut self, spec: &FlowSpec, packets: u64) -> u64 {
        if packets == 0 || !self.resolved.contains(&spec.tx_port) {
            return 0;
        }
        let Some(ingress) = self.facing_interface(&spec.tx_port) else {
            return 0;
        };

        // Ingress ACLs. Packets matching no entry are dropped.
        for acl in self.acls() {
            if !acl.ingress.contains(&ingress) {
                continue;
            }
            let Some(entry) = acl.lookup(spec.src, spec.dst, spec.protocol)
            else {
                return 0;
            };
            let key = (
                acl.name.clone(),
                acl.acl_type.to_string(),
                entry.sequence_id,
            );
            *self.acl_counters.entry(key).or_default() += packets;
            if entry.action == AclAction::Drop {
                return 0;
            }
        }

        if !self.resolved.contains(&spec.rx_port) {
            return 0;
        }
        packets
    }

    // Drops a share of the packets that reached the receiving port. The
    // share is computed over the whole run, so low rates still see loss.
    fn apply_loss(&mut self, flow: &str, reached: u64) -> u64 {
        let loss_ratio = self.loss_ratio;
        let Some(flow) = self.flows.get_mut(flow) else {
            return reached;
        };
        flow.forwarded += reached;
        let lost = (flow.forwarded as f64 * loss_ratio).round() as u64;
        let dropped = lost.saturating_sub(flow.lost).min(reached);
        flow.lost += dropped;
        reached - dropped
    }
}
