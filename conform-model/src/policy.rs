//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyDefinition {
    pub name: String,
    pub statements: Vec<Statement>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Statement {
    pub name: String,
    pub match_prefix_set: Option<String>,
    pub action: PolicyAction,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyAction {
    AcceptRoute,
    RejectRoute,
}

// ===== impl PolicyDefinition =====

impl PolicyDefinition {
    pub fn new(name: impl Into<String>) -> PolicyDefinition {
        PolicyDefinition {
            name: name.into(),
            statements: Vec::new(),
        }
    }

    // Statements are evaluated in insertion order.
    pub fn statement(mut self, statement: Statement) -> Self {
        self.statements.retain(|s| s.name != statement.name);
        self.statements.push(statement);
        self
    }

    /// Single-statement policy accepting every route.
    pub fn accept_all(name: impl Into<String>) -> PolicyDefinition {
        PolicyDefinition::new(name)
            .statement(Statement::new("10", PolicyAction::AcceptRoute))
    }
}

// ===== impl Statement =====

impl Statement {
    pub fn new(name: impl Into<String>, action: PolicyAction) -> Statement {
        Statement {
            name: name.into(),
            match_prefix_set: None,
            action,
        }
    }

    pub fn match_prefix_set(mut self, prefix_set: impl Into<String>) -> Self {
        self.match_prefix_set = Some(prefix_set.into());
        self
    }
}
