//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Isis {
    pub net: String,
    pub level: IsisLevel,
    pub interfaces: Vec<IsisInterface>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsisLevel {
    Level1,
    Level2,
    Level12,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct IsisInterface {
    pub name: String,
    pub metric: u32,
    pub passive: bool,
}

#[derive(Debug)]
pub struct IsisBuilder {
    isis: Isis,
}

// ===== impl Isis =====

impl Isis {
    pub fn builder(net: impl Into<String>) -> IsisBuilder {
        IsisBuilder {
            isis: Isis {
                net: net.into(),
                level: IsisLevel::Level2,
                interfaces: Vec::new(),
            },
        }
    }
}

// ===== impl IsisBuilder =====

impl IsisBuilder {
    pub fn level(mut self, level: IsisLevel) -> Self {
        self.isis.level = level;
        self
    }

    pub fn interface(mut self, name: impl Into<String>, metric: u32) -> Self {
        self.push_interface(name.into(), metric, false);
        self
    }

    pub fn passive_interface(mut self, name: impl Into<String>) -> Self {
        self.push_interface(name.into(), 0, true);
        self
    }

    pub fn build(self) -> Isis {
        self.isis
    }

    fn push_interface(&mut self, name: String, metric: u32, passive: bool) {
        self.isis.interfaces.retain(|intf| intf.name != name);
        self.isis.interfaces.push(IsisInterface {
            name,
            metric,
            passive,
        });
    }
}
