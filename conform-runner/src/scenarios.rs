//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use conform_harness::{
    CaseOutcome, CheckOutcome, ConfigBatch, Convergence, Expectation,
    FailureKind, HarnessConfig, ObservablePath, StopCondition, TestCase,
    TestOrchestrator, TrafficPlan, TrafficReport, VerificationError,
};
use conform_model::{
    AclAction, AclEntry, AclSet, AclType, Bgp, BgpPeer, ConfigPath,
    DEFAULT_NETWORK_INSTANCE, FlowSpec, Interface, Neighbor, Port, Topology,
};
use const_addrs::ip4;
use ipnetwork::{IpNetworkError, Ipv4Network};
use tracing::{error, info};

use crate::config;

const FLOW: &str = "port1-to-port2";
const ACL: &str = "acl-v4";
const DUT_ASN: u32 = 65000;
const ATE_ASN: u32 = 65001;
const DUT_PORT1: Ipv4Addr = ip4!("192.0.2.1");
const DUT_PORT2: Ipv4Addr = ip4!("192.0.2.5");
const ATE_PORT1: Ipv4Addr = ip4!("192.0.2.2");
const ATE_PORT2: Ipv4Addr = ip4!("192.0.2.6");
const PREFIX_LEN: u8 = 30;
// Time the egress port must stay up before traffic starts.
const LINK_HOLD: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scenario {
    BgpConvergence,
    AclUpdate,
}

#[derive(Debug)]
pub enum Error {
    Address(IpNetworkError),
    Harness(conform_harness::Error),
}

// ===== impl Scenario =====

impl Scenario {
    pub const ALL: [Scenario; 2] =
        [Scenario::BgpConvergence, Scenario::AclUpdate];
    pub const NAMES: [&'static str; 2] = ["bgp-convergence", "acl-update"];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::BgpConvergence => Scenario::NAMES[0],
            Scenario::AclUpdate => Scenario::NAMES[1],
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::BgpConvergence => {
                "BGP session establishment gating end-to-end traffic"
            }
            Scenario::AclUpdate => {
                "ACL entry changed from accept to drop while traffic flows"
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Scenario> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name() == name)
    }

    /// Runs every test case of the scenario. Counter baselines start from
    /// scratch.
    pub async fn run(
        &self,
        orchestrator: &mut TestOrchestrator,
        options: &config::Scenario,
    ) -> Result<Vec<CaseOutcome>, Error> {
        info!(scenario = %self.name(), "running scenario");
        let cases = self.cases(orchestrator.config(), options)?;

        orchestrator.reset_baseline();
        if *self == Scenario::AclUpdate {
            for text in &options.vendor_cli {
                orchestrator.session().push_cli(text).await?;
            }
        }
        let outcomes = orchestrator.run_all(cases).await?;
        Ok(outcomes)
    }

    fn cases(
        &self,
        config: &HarnessConfig,
        options: &config::Scenario,
    ) -> Result<Vec<TestCase>, Error> {
        let topology = topology(options)?;
        let interfaces = interfaces()?;
        let drained = StopCondition::Drained {
            timeout: config.drain_timeout,
        };
        // Packets a flow may lose while staying within tolerance.
        let max_dropped = (options.packet_count as f64
            * config.loss_tolerance_pct
            / 100.0) as u64;

        let cases = match self {
            Scenario::BgpConvergence => vec![
                TestCase::new("bgp-established")
                    .config(interfaces.replace(bgp(true)))
                    .topology(topology)
                    .converge(Convergence::bgp_established(&IpAddr::V4(
                        ATE_PORT1,
                    )))
                    .converge(
                        Convergence::equals(
                            ObservablePath::interface_oper_status("port2"),
                            "UP",
                        )
                        .hold(LINK_HOLD),
                    )
                    .traffic(TrafficPlan::Run(drained))
                    .expect(Expectation::loss(FLOW))
                    .expect(Expectation::delivered(
                        FLOW,
                        options.packet_count,
                        max_dropped,
                    )),
                TestCase::new("bgp-neighbor-removed")
                    .config(ConfigBatch::new().replace(bgp(false)))
                    .expect(Expectation::absent(session_state()))
                    .expect(Expectation::state(
                        ObservablePath::interface_oper_status("port1"),
                        "UP",
                    ))
                    .cleanup(
                        cleanup()
                            .delete(ConfigPath::bgp(DEFAULT_NETWORK_INSTANCE)),
                    ),
            ],
            Scenario::AclUpdate => vec![
                TestCase::new("acl-accept")
                    .config(interfaces.replace(acl(AclAction::Accept)?))
                    .topology(topology)
                    .traffic(TrafficPlan::Run(drained))
                    .expect(Expectation::delivered(
                        FLOW,
                        options.packet_count,
                        max_dropped,
                    ))
                    .expect(Expectation::counter_delta(
                        "entry-10",
                        matched_packets(10),
                        options.packet_count,
                    )),
                TestCase::new("acl-drop-while-flowing")
                    .traffic(TrafficPlan::Reconfigure {
                        flow: FLOW.to_owned(),
                        threshold: (options.packet_count / 10).max(1),
                        timeout: config.drain_timeout,
                        batch: ConfigBatch::new()
                            .replace(acl(AclAction::Drop)?),
                        drain_timeout: config.drain_timeout,
                    })
                    .expect(Expectation::custom(partially_delivered))
                    .expect(Expectation::counter_delta(
                        "entry-10",
                        matched_packets(10),
                        options.packet_count,
                    ))
                    .expect(Expectation::counter_delta(
                        "entry-default",
                        matched_packets(AclSet::DEFAULT_ENTRY_ID),
                        0,
                    ))
                    .cleanup(
                        cleanup()
                            .delete(ConfigPath::acl_set(ACL, AclType::Ipv4)),
                    ),
            ],
        };
        Ok(cases)
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::Address(error) => {
                error!(%error, "{}", self);
            }
            Error::Harness(error) => {
                error.log();
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Address(..) => write!(f, "invalid scenario address"),
            Error::Harness(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Address(error) => Some(error),
            Error::Harness(error) => Some(error),
        }
    }
}

impl From<IpNetworkError> for Error {
    fn from(error: IpNetworkError) -> Error {
        Error::Address(error)
    }
}

impl From<conform_harness::Error> for Error {
    fn from(error: conform_harness::Error) -> Error {
        Error::Harness(error)
    }
}

// ===== helper functions =====

fn interfaces() -> Result<ConfigBatch, IpNetworkError> {
    Ok(ConfigBatch::new()
        .replace(
            Interface::builder("port1")
                .description("to ATE port1")
                .ipv4(Ipv4Network::new(DUT_PORT1, PREFIX_LEN)?)
                .build(),
        )
        .replace(
            Interface::builder("port2")
                .description("to ATE port2")
                .ipv4(Ipv4Network::new(DUT_PORT2, PREFIX_LEN)?)
                .build(),
        ))
}

fn bgp(with_neighbor: bool) -> Bgp {
    let builder = Bgp::builder(DUT_ASN, DUT_PORT1);
    if with_neighbor {
        builder
            .neighbor(Neighbor::new(IpAddr::V4(ATE_PORT1), ATE_ASN))
            .build()
    } else {
        builder.build()
    }
}

// Applied on port1 ingress; entry 10 matches the test flow.
fn acl(action: AclAction) -> Result<AclSet, IpNetworkError> {
    let destination = Ipv4Network::new(ATE_PORT2, 32)?;
    Ok(AclSet::builder(ACL, AclType::Ipv4)
        .entry(
            AclEntry::new(10, action)
                .description("test flow")
                .destination(destination.into()),
        )
        .default_action(AclAction::Accept)
        .ingress("port1")
        .build())
}

fn topology(options: &config::Scenario) -> Result<Topology, IpNetworkError> {
    let port1 = Ipv4Network::new(ATE_PORT1, PREFIX_LEN)?;
    let port2 = Ipv4Network::new(ATE_PORT2, PREFIX_LEN)?;
    Ok(Topology::new()
        .port(
            Port::new("port1")
                .address(port1.into(), IpAddr::V4(DUT_PORT1))
                .bgp_peer(BgpPeer {
                    asn: ATE_ASN,
                    router_id: ATE_PORT1,
                    peer_address: IpAddr::V4(DUT_PORT1),
                }),
        )
        .port(Port::new("port2").address(port2.into(), IpAddr::V4(DUT_PORT2)))
        .flow(
            FlowSpec::new(
                FLOW,
                "port1",
                "port2",
                IpAddr::V4(ATE_PORT1),
                IpAddr::V4(ATE_PORT2),
            )
            .packet_count(options.packet_count)
            .rate_pps(options.rate_pps),
        ))
}

fn cleanup() -> ConfigBatch {
    ConfigBatch::new()
        .delete(ConfigPath::interface("port1"))
        .delete(ConfigPath::interface("port2"))
}

fn session_state() -> ObservablePath {
    ObservablePath::bgp_neighbor_state(
        DEFAULT_NETWORK_INSTANCE,
        &IpAddr::V4(ATE_PORT1),
    )
}

fn matched_packets(sequence_id: u32) -> ObservablePath {
    ObservablePath::acl_entry_matched(ACL, AclType::Ipv4, sequence_id)
}

// The flow must have been cut short by the ACL change: some packets made it
// through, the rest were dropped.
fn partially_delivered(report: Option<&TrafficReport>) -> CheckOutcome {
    let counters = report
        .and_then(|report| report.flow(FLOW))
        .copied()
        .unwrap_or_default();
    if counters.received == 0 || counters.received >= counters.sent {
        return Err(VerificationError::new(
            FailureKind::Mismatch,
            format!("{FLOW}: expected partial delivery, got {counters:?}"),
        ));
    }
    Ok(())
}
