//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Configuration push to the device under test.
//!
//! Before sending an operation the session reads the subtree it targets
//! back from the device. Operations whose effect is already reflected there
//! are not sent, so pushing the same batch twice results in no device change
//! the second time, whatever else changed the device in between.

use std::sync::Arc;

use conform_model::{Config, ConfigPath, Family};
use serde_json::Value;

use crate::debug::Debug;
use crate::device::Device;
use crate::error::{Error, Result};

/// One configuration operation.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigOp {
    // Replace the whole subtree rooted at the block's path.
    Replace(Config),
    // Merge the block into the existing subtree.
    Update(Config),
    Delete(ConfigPath),
}

/// Ordered list of configuration operations, applied in list order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigBatch {
    ops: Vec<ConfigOp>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PushOutcome {
    // Number of operations sent to the device and skipped as redundant.
    Applied { applied: usize, skipped: usize },
    // The whole batch was already reflected in the device's running
    // configuration.
    Unchanged,
}

/// Sequential configuration session against one device.
pub struct ConfigSession {
    device: Arc<dyn Device>,
}

// ===== impl ConfigOp =====

impl ConfigOp {
    pub fn path(&self) -> ConfigPath {
        match self {
            ConfigOp::Replace(config) | ConfigOp::Update(config) => {
                config.path()
            }
            ConfigOp::Delete(path) => path.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConfigOp::Replace(_) => "replace",
            ConfigOp::Update(_) => "update",
            ConfigOp::Delete(_) => "delete",
        }
    }

    fn family(&self) -> Option<Family> {
        match self {
            ConfigOp::Replace(config) | ConfigOp::Update(config) => {
                Some(config.family())
            }
            ConfigOp::Delete(_) => None,
        }
    }
}

// ===== impl ConfigBatch =====

impl ConfigBatch {
    pub fn new() -> ConfigBatch {
        ConfigBatch::default()
    }

    pub fn replace(mut self, config: impl Into<Config>) -> Self {
        self.ops.push(ConfigOp::Replace(config.into()));
        self
    }

    pub fn update(mut self, config: impl Into<Config>) -> Self {
        self.ops.push(ConfigOp::Update(config.into()));
        self
    }

    pub fn delete(mut self, path: impl Into<ConfigPath>) -> Self {
        self.ops.push(ConfigOp::Delete(path.into()));
        self
    }

    pub fn push(&mut self, op: ConfigOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConfigOp> {
        self.ops.iter()
    }

    /// Returns the batch with its operations sorted by dependency:
    /// interfaces first, then protocols, then policies. Deletions come last
    /// in reverse dependency order. The sort is stable, so operations of the
    /// same family keep their relative order.
    pub fn ordered(mut self) -> Self {
        self.ops.sort_by_key(|op| match op.family() {
            Some(family) => (0, Some(family), None),
            None => (1, None, Some(std::cmp::Reverse(delete_rank(op)))),
        });
        self
    }
}

impl FromIterator<ConfigOp> for ConfigBatch {
    fn from_iter<I: IntoIterator<Item = ConfigOp>>(iter: I) -> ConfigBatch {
        ConfigBatch {
            ops: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ConfigBatch {
    type Item = &'a ConfigOp;
    type IntoIter = std::slice::Iter<'a, ConfigOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

// ===== impl PushOutcome =====

impl PushOutcome {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, PushOutcome::Unchanged)
    }
}

// ===== impl ConfigSession =====

impl ConfigSession {
    pub fn new(device: Arc<dyn Device>) -> ConfigSession {
        ConfigSession { device }
    }

    /// Applies a batch, one operation at a time and in order.
    ///
    /// The first operation rejected by the device aborts the batch. Earlier
    /// operations stay applied; there is no rollback.
    pub async fn push(&self, batch: &ConfigBatch) -> Result<PushOutcome> {
        Debug::ConfigPush(batch.len()).log();

        let mut applied = 0;
        let mut skipped = 0;
        let mut max_family = None;
        for (index, op) in batch.iter().enumerate() {
            let path = op.path();
            let push_error = |error| Error::ConfigPush {
                index,
                path: path.clone(),
                error,
            };

            // Dependency order is advisory: the device is the judge.
            if let Some(family) = op.family() {
                if let Some(previous) =
                    max_family.filter(|previous| family < *previous)
                {
                    Debug::ConfigOpOutOfOrder(index, family, previous).log();
                }
                max_family = max_family.max(Some(family));
            }

            // Compute the subtree this operation leaves behind, and the value
            // sent to the device.
            let current =
                self.device.get_config(&path).await.map_err(push_error)?;
            let (target, payload) = match op {
                ConfigOp::Replace(config) => {
                    let value = encode(&path, config)?;
                    (Some(value.clone()), Some(value))
                }
                ConfigOp::Update(config) => {
                    let patch = encode(&path, config)?;
                    let mut merged = current.clone().unwrap_or(Value::Null);
                    merge_json(&mut merged, patch.clone());
                    (Some(merged), Some(patch))
                }
                ConfigOp::Delete(_) => (None, None),
            };
            if current == target {
                Debug::ConfigOpUnchanged(index, &path).log();
                skipped += 1;
                continue;
            }

            Debug::ConfigOpApply(index, op.kind(), &path).log();
            let result = match payload {
                Some(value) if matches!(op, ConfigOp::Update(_)) => {
                    self.device.update(&path, value).await
                }
                Some(value) => self.device.replace(&path, value).await,
                None => self.device.delete(&path).await,
            };
            result.map_err(push_error)?;
            applied += 1;
        }

        if applied == 0 {
            Debug::ConfigUnchanged.log();
            return Ok(PushOutcome::Unchanged);
        }
        Ok(PushOutcome::Applied { applied, skipped })
    }

    /// Applies vendor CLI text. CLI changes cannot be read back, so the text
    /// is always sent.
    pub async fn push_cli(&self, text: &str) -> Result<()> {
        self.device.push_cli(text).await?;
        Ok(())
    }

    /// Reads the running configuration subtree at `path` from the device.
    pub async fn running(&self, path: &ConfigPath) -> Result<Option<Value>> {
        let value = self.device.get_config(path).await?;
        Ok(value)
    }
}

impl std::fmt::Debug for ConfigSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSession")
            .field("device", &self.device.name())
            .finish()
    }
}

// ===== global functions =====

/// Merges `patch` into `base`. Objects are merged key by key, any other value
/// replaces the existing one.
pub fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                merge_json(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, patch) => *base = patch,
    }
}

// ===== helper functions =====

fn encode(path: &ConfigPath, config: &Config) -> Result<Value> {
    config
        .to_value()
        .map_err(|error| Error::Encode(path.clone(), error))
}

// Deletions of deeper paths go first.
fn delete_rank(op: &ConfigOp) -> usize {
    op.path().as_str().matches('/').count()
}

#[cfg(test)]
mod tests {
    use conform_model::{AclSet, AclType, Bgp, Interface};
    use const_addrs::ip4;
    use serde_json::json;

    use super::*;

    #[test]
    fn ordered_batch() {
        let acl = AclSet::builder("acl-v4", AclType::Ipv4).build();
        let bgp = Bgp::builder(65000, ip4!("192.0.2.1")).build();
        let intf1 = Interface::builder("port1").build();
        let intf2 = Interface::builder("port2").build();
        let batch = ConfigBatch::new()
            .delete(ConfigPath::interface("port9"))
            .replace(acl)
            .update(bgp)
            .delete(ConfigPath::interface("port9").child("config/mtu"))
            .replace(intf1)
            .replace(intf2)
            .ordered();

        let order = batch
            .iter()
            .map(|op| (op.kind(), op.path().to_string()))
            .collect::<Vec<_>>();
        assert_eq!(order[0].1, "/interfaces/interface[name=port1]");
        assert_eq!(order[1].1, "/interfaces/interface[name=port2]");
        assert_eq!(order[2].0, "update");
        assert_eq!(order[3].0, "replace");
        assert!(order[3].1.starts_with("/acl/"));
        assert_eq!(
            order[4].1,
            "/interfaces/interface[name=port9]/config/mtu"
        );
        assert_eq!(order[5].1, "/interfaces/interface[name=port9]");
    }

    #[test]
    fn json_merge() {
        let mut base = json!({"a": 1, "b": {"c": 2, "d": 3}});
        merge_json(&mut base, json!({"b": {"c": 20}, "e": [1, 2]}));
        assert_eq!(base, json!({"a": 1, "b": {"c": 20, "d": 3}, "e": [1, 2]}));

        let mut base = Value::Null;
        merge_json(&mut base, json!({"a": 1}));
        assert_eq!(base, json!({"a": 1}));
    }
}
