//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Bgp {
    pub asn: u32,
    pub router_id: Ipv4Addr,
    pub peer_groups: Vec<PeerGroup>,
    pub neighbors: Vec<Neighbor>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PeerGroup {
    pub name: String,
    pub peer_as: Option<u32>,
    pub import_policy: Vec<String>,
    pub export_policy: Vec<String>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Neighbor {
    pub address: IpAddr,
    pub peer_as: u32,
    pub peer_group: Option<String>,
    pub enabled: bool,
    pub import_policy: Vec<String>,
    pub export_policy: Vec<String>,
}

#[derive(Debug)]
pub struct BgpBuilder {
    bgp: Bgp,
}

// ===== impl Bgp =====

impl Bgp {
    pub fn builder(asn: u32, router_id: Ipv4Addr) -> BgpBuilder {
        BgpBuilder {
            bgp: Bgp {
                asn,
                router_id,
                peer_groups: Vec::new(),
                neighbors: Vec::new(),
            },
        }
    }

    pub fn neighbor(&self, address: &IpAddr) -> Option<&Neighbor> {
        self.neighbors.iter().find(|nbr| nbr.address == *address)
    }
}

// ===== impl BgpBuilder =====

impl BgpBuilder {
    // A peer group with the same name replaces the previous one.
    pub fn peer_group(mut self, group: PeerGroup) -> Self {
        self.bgp.peer_groups.retain(|pg| pg.name != group.name);
        self.bgp.peer_groups.push(group);
        self
    }

    // A neighbor with the same address replaces the previous one.
    pub fn neighbor(mut self, nbr: Neighbor) -> Self {
        self.bgp.neighbors.retain(|n| n.address != nbr.address);
        self.bgp.neighbors.push(nbr);
        self
    }

    pub fn build(mut self) -> Bgp {
        self.bgp.peer_groups.sort_by(|a, b| a.name.cmp(&b.name));
        self.bgp.neighbors.sort_by_key(|nbr| nbr.address);
        self.bgp
    }
}

// ===== impl PeerGroup =====

impl PeerGroup {
    pub fn new(name: impl Into<String>) -> PeerGroup {
        PeerGroup {
            name: name.into(),
            peer_as: None,
            import_policy: Vec::new(),
            export_policy: Vec::new(),
        }
    }

    pub fn peer_as(mut self, peer_as: u32) -> Self {
        self.peer_as = Some(peer_as);
        self
    }

    pub fn import_policy(mut self, policy: impl Into<String>) -> Self {
        self.import_policy.push(policy.into());
        self
    }

    pub fn export_policy(mut self, policy: impl Into<String>) -> Self {
        self.export_policy.push(policy.into());
        self
    }
}

// ===== impl Neighbor =====

impl Neighbor {
    pub fn new(address: IpAddr, peer_as: u32) -> Neighbor {
        Neighbor {
            address,
            peer_as,
            peer_group: None,
            enabled: true,
            import_policy: Vec::new(),
            export_policy: Vec::new(),
        }
    }

    pub fn peer_group(mut self, name: impl Into<String>) -> Self {
        self.peer_group = Some(name.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn import_policy(mut self, policy: impl Into<String>) -> Self {
        self.import_policy.push(policy.into());
        self
    }

    pub fn export_policy(mut self, policy: impl Into<String>) -> Self {
        self.export_policy.push(policy.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use const_addrs::{ip, ip4};

    use super::*;

    #[test]
    fn neighbors_are_keyed_by_address() {
        let bgp = Bgp::builder(65000, ip4!("192.0.2.1"))
            .neighbor(Neighbor::new(ip!("192.0.2.6"), 65002))
            .neighbor(Neighbor::new(ip!("192.0.2.2"), 65001))
            .neighbor(Neighbor::new(ip!("192.0.2.6"), 65003).peer_group("PG"))
            .build();

        assert_eq!(bgp.neighbors.len(), 2);
        assert_eq!(bgp.neighbors[0].address, ip!("192.0.2.2"));
        let nbr = bgp.neighbor(&ip!("192.0.2.6")).unwrap();
        assert_eq!(nbr.peer_as, 65003);
        assert_eq!(nbr.peer_group.as_deref(), Some("PG"));
    }
}
