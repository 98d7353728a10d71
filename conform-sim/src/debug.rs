//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use conform_harness::FlowCounters;
use conform_model::ConfigPath;
use tracing::{debug, debug_span};

use crate::network::SessionState;

// Emulator debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Device under test
    DeviceReachability(bool),
    ConfigChange(&'a str, &'static str, &'a ConfigPath),
    CliApply(&'a str, usize),
    SessionTransition(&'a IpAddr, Option<SessionState>, SessionState),
    // Traffic generator
    TopologyPush(&'a str, usize, usize),
    ProtocolsChange(&'a str, bool),
    NeighborResolved(&'a str),
    TrafficChange(&'a str, bool),
    FlowDone(&'a str, &'a FlowCounters),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::DeviceReachability(reachable) => {
                debug_span!("sim").in_scope(|| {
                    debug!(%reachable, "{}", self);
                });
            }
            Debug::ConfigChange(device, operation, path) => {
                debug_span!("sim", %device).in_scope(|| {
                    debug!(%operation, %path, "{}", self);
                });
            }
            Debug::CliApply(device, lines) => {
                debug_span!("sim", %device).in_scope(|| {
                    debug!(%lines, "{}", self);
                });
            }
            Debug::SessionTransition(addr, old_state, new_state) => {
                debug_span!("sim").in_scope(|| {
                    debug_span!("bgp", neighbor = %addr).in_scope(|| {
                        debug!(?old_state, %new_state, "{}", self);
                    })
                });
            }
            Debug::TopologyPush(generator, ports, flows) => {
                debug_span!("sim", %generator).in_scope(|| {
                    debug!(%ports, %flows, "{}", self);
                });
            }
            Debug::ProtocolsChange(generator, running)
            | Debug::TrafficChange(generator, running) => {
                debug_span!("sim", %generator).in_scope(|| {
                    debug!(%running, "{}", self);
                });
            }
            Debug::NeighborResolved(port) => {
                debug_span!("sim").in_scope(|| {
                    debug!(%port, "{}", self);
                });
            }
            Debug::FlowDone(flow, counters) => {
                debug_span!("sim").in_scope(|| {
                    debug!(
                        %flow,
                        sent = %counters.sent,
                        received = %counters.received,
                        "{}", self
                    );
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::DeviceReachability(..) => {
                write!(f, "device reachability changed")
            }
            Debug::ConfigChange(..) => {
                write!(f, "configuration changed")
            }
            Debug::CliApply(..) => {
                write!(f, "cli configuration applied")
            }
            Debug::SessionTransition(..) => {
                write!(f, "session state transition")
            }
            Debug::TopologyPush(..) => {
                write!(f, "topology configured")
            }
            Debug::ProtocolsChange(..) => {
                write!(f, "protocol emulation changed")
            }
            Debug::NeighborResolved(..) => {
                write!(f, "neighbor resolved")
            }
            Debug::TrafficChange(..) => {
                write!(f, "traffic generation changed")
            }
            Debug::FlowDone(..) => {
                write!(f, "flow finished transmitting")
            }
        }
    }
}
