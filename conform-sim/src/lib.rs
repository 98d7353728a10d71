//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! In-process emulation of a device under test wired to a traffic
//! generator.
//!
//! Both ends share a single [`SimNetwork`]. BGP sessions come up once the
//! device is configured with a neighbor the generator emulates, flows are
//! forwarded through the device's ingress ACLs, and every counter the
//! harness reads is kept up to date as traffic runs.

#![warn(rust_2018_idioms)]

mod debug;
pub mod device;
pub mod generator;
pub mod network;
mod tasks;

pub use crate::device::SimDevice;
pub use crate::generator::SimGenerator;
pub use crate::network::{SessionState, SimConfig, SimNetwork};
