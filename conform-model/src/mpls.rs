//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Mpls {
    pub ldp_interfaces: Vec<String>,
    pub static_lsps: Vec<StaticLsp>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StaticLsp {
    pub name: String,
    pub incoming_label: u32,
    pub nexthop: IpAddr,
    pub push_label: Option<u32>,
}

#[derive(Debug, Default)]
pub struct MplsBuilder {
    mpls: Mpls,
}

// ===== impl Mpls =====

impl Mpls {
    pub fn builder() -> MplsBuilder {
        MplsBuilder::default()
    }
}

// ===== impl MplsBuilder =====

impl MplsBuilder {
    pub fn ldp_interface(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.mpls.ldp_interfaces.contains(&name) {
            self.mpls.ldp_interfaces.push(name);
        }
        self
    }

    pub fn static_lsp(mut self, lsp: StaticLsp) -> Self {
        self.mpls.static_lsps.retain(|l| l.name != lsp.name);
        self.mpls.static_lsps.push(lsp);
        self
    }

    pub fn build(self) -> Mpls {
        self.mpls
    }
}

// ===== impl StaticLsp =====

impl StaticLsp {
    pub fn new(
        name: impl Into<String>,
        incoming_label: u32,
        nexthop: IpAddr,
    ) -> StaticLsp {
        StaticLsp {
            name: name.into(),
            incoming_label,
            nexthop,
            push_label: None,
        }
    }

    pub fn push_label(mut self, label: u32) -> Self {
        self.push_label = Some(label);
        self
    }
}
