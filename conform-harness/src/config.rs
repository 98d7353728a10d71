//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};

/// Harness tunables, usually read from the `[harness]` section of the runner
/// configuration file.
#[serde_as]
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    // First polling interval, doubled after every sample.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval_min: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval_max: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub convergence_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub arp_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub drain_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub state_timeout: Duration,
    // Wait for every addressed generator port to resolve its gateway
    // before checking convergence.
    pub await_arp: bool,
    pub loss_tolerance_pct: f64,
}

// ===== impl HarnessConfig =====

impl Default for HarnessConfig {
    fn default() -> HarnessConfig {
        HarnessConfig {
            poll_interval_min: Duration::from_millis(100),
            poll_interval_max: Duration::from_secs(5),
            convergence_timeout: Duration::from_secs(120),
            arp_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(60),
            state_timeout: Duration::from_secs(10),
            await_arp: true,
            loss_tolerance_pct: 1.0,
        }
    }
}
