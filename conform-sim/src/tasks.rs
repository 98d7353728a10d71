//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;
use std::ops::ControlFlow;
use std::sync::Weak;
use std::time::Duration;

use conform_utils::task::{IntervalTask, TimeoutTask};

use crate::network::Shared;

//
// Emulator tasks diagram:
//                         +--------------+
//      SimDevice  ------> |              | <------  SimGenerator
//    (config, get)        | NetworkState |     (topology, traffic)
//                         |              |
//                         +--------------+
//                              ^    ^
//             bgp_establish    |    |    traffic_tick
//             (Nx, one-shot)   |    |    (1x, while flows transmit)
//                              |    |
//                         +--------------+
//                         |   version    | -> (Nx) subscriptions
//                         +--------------+
//

// ===== emulator tasks =====

// BGP session establishment timer.
pub(crate) fn bgp_establish(
    delay: Duration,
    shared: Weak<Shared>,
    addr: IpAddr,
) -> TimeoutTask {
    TimeoutTask::new(delay, move || async move {
        if let Some(shared) = shared.upgrade() {
            shared.establish(addr);
        }
    })
}

// Traffic generation task. Ends when no flow is transmitting anymore.
pub(crate) fn traffic_tick(
    tick: Duration,
    shared: Weak<Shared>,
) -> IntervalTask {
    IntervalTask::new(tick, false, move || {
        let shared = shared.clone();
        async move {
            match shared.upgrade() {
                Some(shared) if shared.tick() => ControlFlow::Continue(()),
                _ => ControlFlow::Break(()),
            }
        }
    })
}
