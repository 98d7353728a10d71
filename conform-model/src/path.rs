//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

use crate::acl::AclType;

/// Schema path locating a configuration subtree on the device.
///
/// Paths use the usual `/elem[key=value]/elem` notation. They are compared as
/// plain strings, so two paths are equal only if they were built the same
/// way.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct ConfigPath(String);

// ===== impl ConfigPath =====

impl ConfigPath {
    pub fn new(path: impl Into<String>) -> ConfigPath {
        ConfigPath(path.into())
    }

    pub fn interface(name: &str) -> ConfigPath {
        ConfigPath(format!("/interfaces/interface[name={name}]"))
    }

    pub fn network_instance(name: &str) -> ConfigPath {
        ConfigPath(format!(
            "/network-instances/network-instance[name={name}]"
        ))
    }

    pub fn protocol(ni: &str, identifier: &str, name: &str) -> ConfigPath {
        ConfigPath::network_instance(ni).child(&format!(
            "protocols/protocol[identifier={identifier}][name={name}]"
        ))
    }

    pub fn bgp(ni: &str) -> ConfigPath {
        ConfigPath::protocol(ni, "BGP", "BGP").child("bgp")
    }

    pub fn isis(ni: &str) -> ConfigPath {
        ConfigPath::protocol(ni, "ISIS", "ISIS").child("isis")
    }

    pub fn mpls(ni: &str) -> ConfigPath {
        ConfigPath::network_instance(ni).child("mpls")
    }

    pub fn acl_set(name: &str, acl_type: AclType) -> ConfigPath {
        ConfigPath(format!(
            "/acl/acl-sets/acl-set[name={name}][type={acl_type}]"
        ))
    }

    pub fn policy_definition(name: &str) -> ConfigPath {
        ConfigPath(format!(
            "/routing-policy/policy-definitions/policy-definition[name={name}]"
        ))
    }

    /// Returns a new path with the given element(s) appended.
    pub fn child(&self, elem: &str) -> ConfigPath {
        ConfigPath(format!("{}/{}", self.0, elem.trim_start_matches('/')))
    }

    /// Returns whether this path is `other` or one of its ancestors.
    pub fn contains(&self, other: &ConfigPath) -> bool {
        other.0 == self.0
            || (other.0.starts_with(&self.0)
                && other.0[self.0.len()..].starts_with('/'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConfigPath {
    fn from(path: &str) -> ConfigPath {
        ConfigPath::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_paths() {
        assert_eq!(
            ConfigPath::bgp("DEFAULT").as_str(),
            "/network-instances/network-instance[name=DEFAULT]/protocols/protocol[identifier=BGP][name=BGP]/bgp"
        );
        assert_eq!(
            ConfigPath::acl_set("acl-v6", AclType::Ipv6).as_str(),
            "/acl/acl-sets/acl-set[name=acl-v6][type=ACL_IPV6]"
        );
    }

    #[test]
    fn containment_respects_element_boundaries() {
        let intf = ConfigPath::interface("port1");
        let child = intf.child("config/mtu");
        assert!(intf.contains(&intf));
        assert!(intf.contains(&child));
        assert!(!child.contains(&intf));

        let sibling = ConfigPath::new("/interfaces/interface[name=port1]x");
        assert!(!intf.contains(&sibling));
    }
}
