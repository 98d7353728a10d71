//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;

use crate::debug::Debug;

/// Last reading of monotonic device counters, keyed by name.
///
/// Device counters are never cleared between test cases, so assertions are
/// made on the difference between two readings. The baseline belongs to one
/// test sequence and is not meant to be shared.
#[derive(Clone, Debug, Default)]
pub struct CounterBaseline {
    counters: HashMap<String, u64>,
}

// ===== impl CounterBaseline =====

impl CounterBaseline {
    pub fn new() -> CounterBaseline {
        CounterBaseline::default()
    }

    /// Returns the last recorded reading, zero if there is none.
    pub fn get(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    /// Records `current` and returns how much the counter advanced since the
    /// previous reading.
    ///
    /// A reading below the previous one means the counter was cleared on the
    /// device, in which case the whole reading counts as the delta.
    pub fn delta(&mut self, key: &str, current: u64) -> u64 {
        let previous = self.counters.insert(key.to_owned(), current);
        match previous {
            Some(previous) if current >= previous => current - previous,
            _ => current,
        }
    }

    pub fn reset(&mut self) {
        Debug::BaselineReset.log();
        self.counters.clear();
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_since_previous_reading() {
        let mut baseline = CounterBaseline::new();
        assert_eq!(baseline.delta("acl/10", 40), 40);
        assert_eq!(baseline.delta("acl/10", 140), 100);
        assert_eq!(baseline.get("acl/10"), 140);
        assert_eq!(baseline.delta("acl/20", 5), 5);
        assert_eq!(baseline.len(), 2);
    }

    #[test]
    fn cleared_counter() {
        let mut baseline = CounterBaseline::new();
        baseline.delta("acl/10", 500);
        assert_eq!(baseline.delta("acl/10", 20), 20);

        baseline.reset();
        assert!(baseline.is_empty());
        assert_eq!(baseline.get("acl/10"), 0);
    }
}
