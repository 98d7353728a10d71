//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod orchestrator;
mod session;
mod traffic;
mod watcher;

use std::sync::{Arc, Once};

use conform_harness::{
    ConfigBatch, ConfigSession, HarnessConfig, TestOrchestrator,
};
use conform_model::{
    AclAction, AclEntry, AclSet, AclType, Bgp, BgpPeer, FlowSpec, Interface,
    Neighbor, Port, Topology,
};
use conform_sim::{SimConfig, SimDevice, SimGenerator, SimNetwork};
use const_addrs::{ip, ip4};
use tracing::info;

static INIT: Once = Once::new();

pub const FLOW: &str = "port1-to-port2";
pub const ACL: &str = "acl-v4";

pub struct Setup {
    pub network: SimNetwork,
    pub dut: Arc<SimDevice>,
    pub ate: Arc<SimGenerator>,
}

// ===== impl Setup =====

impl Setup {
    pub fn new(config: SimConfig) -> Setup {
        INIT.call_once(init_tracing);
        let network = SimNetwork::new(config);
        let dut = network.device("dut");
        let ate = network.generator("ate");
        Setup { network, dut, ate }
    }

    pub fn session(&self) -> ConfigSession {
        ConfigSession::new(self.dut.clone())
    }

    pub fn orchestrator(&self) -> TestOrchestrator {
        TestOrchestrator::new(
            self.dut.clone(),
            self.ate.clone(),
            HarnessConfig::default(),
        )
    }
}

// ===== helper functions =====

// Initializes tracing subscriber.
fn init_tracing() {
    tracing_subscriber::fmt::Subscriber::builder()
        .with_target(false)
        .with_ansi(false)
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("starting");
}

// ===== global functions =====

pub fn interfaces() -> ConfigBatch {
    ConfigBatch::new()
        .replace(
            Interface::builder("port1")
                .description("to ATE port1")
                .ipv4("192.0.2.1/30".parse().unwrap())
                .build(),
        )
        .replace(
            Interface::builder("port2")
                .description("to ATE port2")
                .ipv4("192.0.2.5/30".parse().unwrap())
                .build(),
        )
}

pub fn bgp(peer_as: u32) -> Bgp {
    Bgp::builder(65000, ip4!("192.0.2.1"))
        .neighbor(Neighbor::new(ip!("192.0.2.2"), peer_as))
        .build()
}

// ACL applied on port1 ingress whose entry 10 matches the test flow.
pub fn acl(action: AclAction) -> AclSet {
    AclSet::builder(ACL, AclType::Ipv4)
        .entry(
            AclEntry::new(10, action)
                .description("test flow")
                .destination("192.0.2.6/32".parse().unwrap()),
        )
        .default_action(AclAction::Accept)
        .ingress("port1")
        .build()
}

pub fn topology(packet_count: u64) -> Topology {
    Topology::new()
        .port(
            Port::new("port1")
                .address("192.0.2.2/30".parse().unwrap(), ip!("192.0.2.1"))
                .bgp_peer(BgpPeer {
                    asn: 65001,
                    router_id: ip4!("192.0.2.2"),
                    peer_address: ip!("192.0.2.1"),
                }),
        )
        .port(
            Port::new("port2")
                .address("192.0.2.6/30".parse().unwrap(), ip!("192.0.2.5")),
        )
        .flow(
            FlowSpec::new(
                FLOW,
                "port1",
                "port2",
                ip!("192.0.2.2"),
                ip!("192.0.2.6"),
            )
            .packet_count(packet_count),
        )
}
