//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ipnetwork::{Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[skip_serializing_none]
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Interface {
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub mtu: Option<u16>,
    pub ipv4: Vec<Ipv4Network>,
    pub ipv6: Vec<Ipv6Network>,
}

#[derive(Debug)]
pub struct InterfaceBuilder {
    intf: Interface,
}

// ===== impl Interface =====

impl Interface {
    pub fn builder(name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder {
            intf: Interface {
                name: name.into(),
                description: None,
                enabled: true,
                mtu: None,
                ipv4: Vec::new(),
                ipv6: Vec::new(),
            },
        }
    }
}

// ===== impl InterfaceBuilder =====

impl InterfaceBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.intf.description = Some(description.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.intf.enabled = enabled;
        self
    }

    pub fn mtu(mut self, mtu: u16) -> Self {
        self.intf.mtu = Some(mtu);
        self
    }

    pub fn ipv4(mut self, addr: Ipv4Network) -> Self {
        if !self.intf.ipv4.contains(&addr) {
            self.intf.ipv4.push(addr);
        }
        self
    }

    pub fn ipv6(mut self, addr: Ipv6Network) -> Self {
        if !self.intf.ipv6.contains(&addr) {
            self.intf.ipv6.push(addr);
        }
        self
    }

    pub fn build(self) -> Interface {
        self.intf
    }
}
