//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AclSet {
    pub name: String,
    pub acl_type: AclType,
    pub entries: Vec<AclEntry>,
    pub ingress: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AclType {
    #[serde(rename = "ACL_IPV4")]
    Ipv4,
    #[serde(rename = "ACL_IPV6")]
    Ipv6,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AclEntry {
    pub sequence_id: u32,
    pub description: Option<String>,
    pub source: Option<IpNetwork>,
    pub destination: Option<IpNetwork>,
    pub protocol: Option<u8>,
    pub action: AclAction,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AclAction {
    Accept,
    Drop,
}

#[derive(Debug)]
pub struct AclSetBuilder {
    acl: AclSet,
}

// ===== impl AclSet =====

impl AclSet {
    // Sequence number of the catch-all entry appended by
    // `AclSetBuilder::default_action`.
    pub const DEFAULT_ENTRY_ID: u32 = 1000;

    pub fn builder(
        name: impl Into<String>,
        acl_type: AclType,
    ) -> AclSetBuilder {
        AclSetBuilder {
            acl: AclSet {
                name: name.into(),
                acl_type,
                entries: Vec::new(),
                ingress: Vec::new(),
            },
        }
    }

    /// Returns the first entry (in sequence order) matching the given
    /// addresses and protocol.
    pub fn lookup(
        &self,
        src: IpAddr,
        dst: IpAddr,
        protocol: Option<u8>,
    ) -> Option<&AclEntry> {
        self.entries
            .iter()
            .find(|entry| entry.matches(src, dst, protocol))
    }
}

// ===== impl AclSetBuilder =====

impl AclSetBuilder {
    // An entry with the same sequence number replaces the previous one.
    pub fn entry(mut self, entry: AclEntry) -> Self {
        self.acl
            .entries
            .retain(|e| e.sequence_id != entry.sequence_id);
        self.acl.entries.push(entry);
        self
    }

    pub fn default_action(self, action: AclAction) -> Self {
        let entry = AclEntry::new(AclSet::DEFAULT_ENTRY_ID, action)
            .description("default");
        self.entry(entry)
    }

    pub fn ingress(mut self, interface: impl Into<String>) -> Self {
        let interface = interface.into();
        if !self.acl.ingress.contains(&interface) {
            self.acl.ingress.push(interface);
        }
        self
    }

    pub fn build(mut self) -> AclSet {
        self.acl.entries.sort_by_key(|entry| entry.sequence_id);
        self.acl
    }
}

// ===== impl AclType =====

impl std::fmt::Display for AclType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AclType::Ipv4 => write!(f, "ACL_IPV4"),
            AclType::Ipv6 => write!(f, "ACL_IPV6"),
        }
    }
}

// ===== impl AclEntry =====

impl AclEntry {
    pub fn new(sequence_id: u32, action: AclAction) -> AclEntry {
        AclEntry {
            sequence_id,
            description: None,
            source: None,
            destination: None,
            protocol: None,
            action,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn source(mut self, source: IpNetwork) -> Self {
        self.source = Some(source);
        self
    }

    pub fn destination(mut self, destination: IpNetwork) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = Some(protocol);
        self
    }

    // Unset match fields act as wildcards.
    pub fn matches(
        &self,
        src: IpAddr,
        dst: IpAddr,
        protocol: Option<u8>,
    ) -> bool {
        self.source.is_none_or(|net| net.contains(src))
            && self.destination.is_none_or(|net| net.contains(dst))
            && (self.protocol.is_none() || self.protocol == protocol)
    }
}

#[cfg(test)]
mod tests {
    use const_addrs::ip;

    use super::*;

    #[test]
    fn lookup_follows_sequence_order() {
        let acl = AclSet::builder("acl-v4", AclType::Ipv4)
            .default_action(AclAction::Accept)
            .entry(
                AclEntry::new(20, AclAction::Accept)
                    .source("198.51.100.0/24".parse().unwrap()),
            )
            .entry(
                AclEntry::new(10, AclAction::Drop)
                    .source("198.51.100.128/25".parse().unwrap()),
            )
            .build();

        let dst = ip!("203.0.113.1");
        let entry = acl.lookup(ip!("198.51.100.200"), dst, None).unwrap();
        assert_eq!(entry.sequence_id, 10);
        let entry = acl.lookup(ip!("198.51.100.1"), dst, None).unwrap();
        assert_eq!(entry.sequence_id, 20);
        let entry = acl.lookup(ip!("192.0.2.1"), dst, None).unwrap();
        assert_eq!(entry.sequence_id, AclSet::DEFAULT_ENTRY_ID);
    }

    #[test]
    fn protocol_match() {
        let entry = AclEntry::new(10, AclAction::Drop).protocol(6);
        let (src, dst) = (ip!("192.0.2.1"), ip!("192.0.2.2"));
        assert!(entry.matches(src, dst, Some(6)));
        assert!(!entry.matches(src, dst, Some(17)));
        assert!(!entry.matches(src, dst, None));
    }
}
