//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use conform_model::{ConfigPath, Family};
use serde_json::Value;
use tracing::{debug, debug_span};

use crate::path::ObservablePath;
use crate::traffic::TrafficState;
use crate::verify::VerificationError;

// Harness debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Watcher
    WatchStart(&'a ObservablePath, Duration, &'static str),
    WatchSatisfied(&'a ObservablePath, Duration, usize),
    WatchTimeout(&'a ObservablePath, Duration, Option<&'a Value>),
    // Configuration
    ConfigPush(usize),
    ConfigOpApply(usize, &'static str, &'a ConfigPath),
    ConfigOpUnchanged(usize, &'a ConfigPath),
    ConfigOpOutOfOrder(usize, Family, Family),
    ConfigUnchanged,
    // Traffic
    TrafficTransition(TrafficState, TrafficState),
    // Verification
    CheckFailed(usize, &'a VerificationError),
    BaselineReset,
    CaseStart(&'a str),
    CaseEnd(&'a str, usize),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::WatchStart(path, timeout, mode) => {
                debug_span!("watch", %path).in_scope(|| {
                    debug!(?timeout, %mode, "{}", self);
                });
            }
            Debug::WatchSatisfied(path, elapsed, samples) => {
                debug_span!("watch", %path).in_scope(|| {
                    debug!(?elapsed, %samples, "{}", self);
                });
            }
            Debug::WatchTimeout(path, timeout, last) => {
                debug_span!("watch", %path).in_scope(|| {
                    debug!(?timeout, ?last, "{}", self);
                });
            }
            Debug::ConfigPush(ops) => {
                debug_span!("config").in_scope(|| {
                    debug!(%ops, "{}", self);
                });
            }
            Debug::ConfigOpApply(index, kind, path) => {
                debug_span!("config").in_scope(|| {
                    debug!(%index, %kind, %path, "{}", self);
                });
            }
            Debug::ConfigOpUnchanged(index, path) => {
                debug_span!("config").in_scope(|| {
                    debug!(%index, %path, "{}", self);
                });
            }
            Debug::ConfigOpOutOfOrder(index, family, previous) => {
                debug_span!("config").in_scope(|| {
                    debug!(%index, %family, %previous, "{}", self);
                });
            }
            Debug::ConfigUnchanged => {
                debug_span!("config").in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::TrafficTransition(old_state, new_state) => {
                debug_span!("traffic").in_scope(|| {
                    debug!(%old_state, %new_state, "{}", self);
                });
            }
            Debug::CheckFailed(index, error) => {
                debug_span!("verify").in_scope(|| {
                    debug!(%index, kind = ?error.kind, %error, "{}", self);
                });
            }
            Debug::BaselineReset => {
                debug_span!("verify").in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::CaseStart(name) => {
                debug_span!("case", %name).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::CaseEnd(name, failures) => {
                debug_span!("case", %name).in_scope(|| {
                    debug!(%failures, "{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::WatchStart(..) => {
                write!(f, "waiting for predicate")
            }
            Debug::WatchSatisfied(..) => {
                write!(f, "predicate satisfied")
            }
            Debug::WatchTimeout(..) => {
                write!(f, "predicate not satisfied before timeout")
            }
            Debug::ConfigPush(..) => {
                write!(f, "pushing configuration batch")
            }
            Debug::ConfigOpApply(..) => {
                write!(f, "applying operation")
            }
            Debug::ConfigOpUnchanged(..) => {
                write!(f, "operation matches running configuration")
            }
            Debug::ConfigOpOutOfOrder(..) => {
                write!(f, "operation precedes a family it may depend on")
            }
            Debug::ConfigUnchanged => {
                write!(f, "batch matches running configuration, skipping")
            }
            Debug::TrafficTransition(..) => {
                write!(f, "state transition")
            }
            Debug::CheckFailed(..) => {
                write!(f, "check failed")
            }
            Debug::BaselineReset => {
                write!(f, "counter baseline reset")
            }
            Debug::CaseStart(..) => {
                write!(f, "test case started")
            }
            Debug::CaseEnd(..) => {
                write!(f, "test case finished")
            }
        }
    }
}
