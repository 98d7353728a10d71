//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Configuration object model consumed by the conformance harness.
//!
//! Every configuration block is an immutable value produced by an explicit
//! builder. A [`Config`] tags the block with its family and knows the path it
//! is rooted at, so a batch of blocks can be handed to the device as-is.

#![warn(rust_2018_idioms)]

pub mod acl;
pub mod bgp;
pub mod interface;
pub mod isis;
pub mod mpls;
pub mod path;
pub mod policy;
pub mod topology;

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

pub use crate::acl::{AclAction, AclEntry, AclSet, AclType};
pub use crate::bgp::{Bgp, Neighbor, PeerGroup};
pub use crate::interface::Interface;
pub use crate::isis::{Isis, IsisInterface, IsisLevel};
pub use crate::mpls::{Mpls, StaticLsp};
pub use crate::path::ConfigPath;
pub use crate::policy::{PolicyAction, PolicyDefinition, Statement};
pub use crate::topology::{BgpPeer, FlowSpec, Port, Topology};

// Name of the network instance every protocol block lives in.
pub const DEFAULT_NETWORK_INSTANCE: &str = "DEFAULT";

/// A populated configuration block, tagged per family.
#[derive(Clone, Debug, EnumAsInner, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Config {
    Interface(Interface),
    Bgp(Bgp),
    Isis(Isis),
    Acl(AclSet),
    Mpls(Mpls),
    Policy(PolicyDefinition),
}

/// Coarse configuration families, ordered by dependency: later families
/// commonly reference names declared by earlier ones.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Interface,
    Protocol,
    Policy,
}

// ===== impl Config =====

impl Config {
    /// Returns the family this block belongs to.
    pub fn family(&self) -> Family {
        match self {
            Config::Interface(_) => Family::Interface,
            Config::Bgp(_) | Config::Isis(_) | Config::Mpls(_) => {
                Family::Protocol
            }
            Config::Acl(_) | Config::Policy(_) => Family::Policy,
        }
    }

    /// Returns the path the block is rooted at.
    pub fn path(&self) -> ConfigPath {
        match self {
            Config::Interface(intf) => ConfigPath::interface(&intf.name),
            Config::Bgp(_) => ConfigPath::bgp(DEFAULT_NETWORK_INSTANCE),
            Config::Isis(_) => ConfigPath::isis(DEFAULT_NETWORK_INSTANCE),
            Config::Acl(acl) => ConfigPath::acl_set(&acl.name, acl.acl_type),
            Config::Mpls(_) => ConfigPath::mpls(DEFAULT_NETWORK_INSTANCE),
            Config::Policy(policy) => {
                ConfigPath::policy_definition(&policy.name)
            }
        }
    }

    /// Returns the JSON representation of the block (without the family
    /// tag), as pushed to the device.
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Config::Interface(intf) => serde_json::to_value(intf),
            Config::Bgp(bgp) => serde_json::to_value(bgp),
            Config::Isis(isis) => serde_json::to_value(isis),
            Config::Acl(acl) => serde_json::to_value(acl),
            Config::Mpls(mpls) => serde_json::to_value(mpls),
            Config::Policy(policy) => serde_json::to_value(policy),
        }
    }
}

impl From<Interface> for Config {
    fn from(intf: Interface) -> Config {
        Config::Interface(intf)
    }
}

impl From<Bgp> for Config {
    fn from(bgp: Bgp) -> Config {
        Config::Bgp(bgp)
    }
}

impl From<Isis> for Config {
    fn from(isis: Isis) -> Config {
        Config::Isis(isis)
    }
}

impl From<AclSet> for Config {
    fn from(acl: AclSet) -> Config {
        Config::Acl(acl)
    }
}

impl From<Mpls> for Config {
    fn from(mpls: Mpls) -> Config {
        Config::Mpls(mpls)
    }
}

impl From<PolicyDefinition> for Config {
    fn from(policy: PolicyDefinition) -> Config {
        Config::Policy(policy)
    }
}

// ===== impl Family =====

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Interface => write!(f, "interface"),
            Family::Protocol => write!(f, "protocol"),
            Family::Policy => write!(f, "policy"),
        }
    }
}
