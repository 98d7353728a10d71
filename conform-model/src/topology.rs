//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Traffic generator topology: emulated ports and the flows sent between
//! them.

use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Topology {
    pub ports: Vec<Port>,
    pub flows: Vec<FlowSpec>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Port {
    pub name: String,
    pub address: Option<IpNetwork>,
    pub gateway: Option<IpAddr>,
    pub bgp_peer: Option<BgpPeer>,
}

// BGP speaker emulated behind a generator port.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BgpPeer {
    pub asn: u32,
    pub router_id: Ipv4Addr,
    pub peer_address: IpAddr,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlowSpec {
    pub name: String,
    pub tx_port: String,
    pub rx_port: String,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub protocol: Option<u8>,
    // Unset means the flow runs until explicitly stopped.
    pub packet_count: Option<u64>,
    pub rate_pps: u64,
    pub frame_size: u16,
}

// ===== impl Topology =====

impl Topology {
    pub fn new() -> Topology {
        Topology::default()
    }

    // A port with the same name replaces the previous one.
    pub fn port(mut self, port: Port) -> Self {
        self.ports.retain(|p| p.name != port.name);
        self.ports.push(port);
        self
    }

    // A flow with the same name replaces the previous one.
    pub fn flow(mut self, flow: FlowSpec) -> Self {
        self.flows.retain(|f| f.name != flow.name);
        self.flows.push(flow);
        self
    }

    pub fn get_port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|port| port.name == name)
    }

    pub fn get_flow(&self, name: &str) -> Option<&FlowSpec> {
        self.flows.iter().find(|flow| flow.name == name)
    }

    pub fn flow_names(&self) -> impl Iterator<Item = &str> {
        self.flows.iter().map(|flow| flow.name.as_str())
    }
}

// ===== impl Port =====

impl Port {
    pub fn new(name: impl Into<String>) -> Port {
        Port {
            name: name.into(),
            address: None,
            gateway: None,
            bgp_peer: None,
        }
    }

    pub fn address(mut self, address: IpNetwork, gateway: IpAddr) -> Self {
        self.address = Some(address);
        self.gateway = Some(gateway);
        self
    }

    pub fn bgp_peer(mut self, peer: BgpPeer) -> Self {
        self.bgp_peer = Some(peer);
        self
    }
}

// ===== impl FlowSpec =====

impl FlowSpec {
    pub const DFLT_RATE_PPS: u64 = 1000;
    pub const DFLT_FRAME_SIZE: u16 = 512;

    pub fn new(
        name: impl Into<String>,
        tx_port: impl Into<String>,
        rx_port: impl Into<String>,
        src: IpAddr,
        dst: IpAddr,
    ) -> FlowSpec {
        FlowSpec {
            name: name.into(),
            tx_port: tx_port.into(),
            rx_port: rx_port.into(),
            src,
            dst,
            protocol: None,
            packet_count: None,
            rate_pps: FlowSpec::DFLT_RATE_PPS,
            frame_size: FlowSpec::DFLT_FRAME_SIZE,
        }
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn packet_count(mut self, count: u64) -> Self {
        self.packet_count = Some(count);
        self
    }

    pub fn rate_pps(mut self, rate: u64) -> Self {
        self.rate_pps = rate;
        self
    }

    pub fn frame_size(mut self, size: u16) -> Self {
        self.frame_size = size;
        self
    }
}
