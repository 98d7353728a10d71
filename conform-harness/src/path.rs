//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;
use std::sync::Arc;

use conform_model::{AclType, ConfigPath};
use serde::{Deserialize, Serialize};

/// Identifier of an operational-state leaf on the device or on the traffic
/// generator.
///
/// The underlying string is shared, so paths are cheap to clone into watch
/// tasks.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct ObservablePath(Arc<str>);

// ===== impl ObservablePath =====

impl ObservablePath {
    pub fn new(path: impl AsRef<str>) -> ObservablePath {
        ObservablePath(Arc::from(path.as_ref()))
    }

    pub fn interface_oper_status(name: &str) -> ObservablePath {
        ConfigPath::interface(name).child("state/oper-status").into()
    }

    pub fn bgp_neighbor_state(ni: &str, addr: &IpAddr) -> ObservablePath {
        bgp_neighbor(ni, addr).child("state/session-state").into()
    }

    pub fn acl_entry_matched(
        name: &str,
        acl_type: AclType,
        sequence_id: u32,
    ) -> ObservablePath {
        ConfigPath::acl_set(name, acl_type)
            .child(&format!(
                "acl-entries/acl-entry[sequence-id={sequence_id}]/state/matched-packets"
            ))
            .into()
    }

    pub fn flow_out_pkts(flow: &str) -> ObservablePath {
        flow_leaf(flow, "counters/out-pkts")
    }

    pub fn flow_in_pkts(flow: &str) -> ObservablePath {
        flow_leaf(flow, "counters/in-pkts")
    }

    pub fn flow_transmit(flow: &str) -> ObservablePath {
        flow_leaf(flow, "transmit")
    }

    pub fn port_neighbor_resolved(port: &str) -> ObservablePath {
        ObservablePath::new(format!(
            "/ports/port[name={port}]/state/neighbor-resolved"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the value of the first `[key=value]` predicate named `key`.
    pub fn key(&self, key: &str) -> Option<&str> {
        let pattern = format!("[{key}=");
        let start = self.0.find(&pattern)? + pattern.len();
        let end = self.0[start..].find(']')? + start;
        Some(&self.0[start..end])
    }
}

impl std::fmt::Display for ObservablePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ObservablePath {
    fn from(path: &str) -> ObservablePath {
        ObservablePath::new(path)
    }
}

impl From<ConfigPath> for ObservablePath {
    fn from(path: ConfigPath) -> ObservablePath {
        ObservablePath::new(path.as_str())
    }
}

impl From<&ConfigPath> for ObservablePath {
    fn from(path: &ConfigPath) -> ObservablePath {
        ObservablePath::new(path.as_str())
    }
}

// ===== helper functions =====

fn flow_leaf(flow: &str, leaf: &str) -> ObservablePath {
    ObservablePath::new(format!("/flows/flow[name={flow}]/state/{leaf}"))
}

fn bgp_neighbor(ni: &str, addr: &IpAddr) -> ConfigPath {
    ConfigPath::bgp(ni)
        .child(&format!("neighbors/neighbor[neighbor-address={addr}]"))
}

#[cfg(test)]
mod tests {
    use const_addrs::ip;

    use super::*;

    #[test]
    fn neighbor_state_path() {
        let path =
            ObservablePath::bgp_neighbor_state("DEFAULT", &ip!("192.0.2.2"));
        assert!(path.as_str().ends_with(
            "/bgp/neighbors/neighbor[neighbor-address=192.0.2.2]/state/session-state"
        ));
        assert_eq!(path.key("neighbor-address"), Some("192.0.2.2"));
        assert_eq!(path.key("name"), Some("DEFAULT"));
        assert_eq!(path.key("sequence-id"), None);
    }

    #[test]
    fn acl_counter_path() {
        let path =
            ObservablePath::acl_entry_matched("acl-v4", AclType::Ipv4, 10);
        assert_eq!(path.key("type"), Some("ACL_IPV4"));
        assert_eq!(path.key("sequence-id"), Some("10"));
        assert!(path.as_str().ends_with("/state/matched-packets"));
    }
}
