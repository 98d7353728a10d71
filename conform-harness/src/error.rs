//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use conform_model::ConfigPath;
use conform_utils::with_source;
use tracing::{error, warn};

use crate::path::ObservablePath;
use crate::traffic::{TrafficOp, TrafficState};

//
// Type aliases.
//
pub type Result<T> = std::result::Result<T, Error>;

// Harness errors.
//
// Every variant is fatal to the test case that hit it. Predicates that never
// hold and failed assertions are not errors: they are reported through
// `WatchResult` and `VerificationErrors` respectively.
#[derive(Debug)]
pub enum Error {
    Transport(TransportError),
    InvalidTimeout(ObservablePath, Duration),
    Decode(ObservablePath, serde_json::Error),
    SubscriptionClosed(ObservablePath),
    Encode(ConfigPath, serde_json::Error),
    ConfigPush {
        index: usize,
        path: ConfigPath,
        error: TransportError,
    },
    InvalidTransition(TrafficState, TrafficOp),
    NotConverged,
    UnknownFlow(String),
    TaskJoin(tokio::task::JoinError),
}

// Failures reported by the device or traffic generator collaborators.
#[derive(Debug)]
pub enum TransportError {
    Unreachable(String),
    Rejected(String),
    Unsupported(&'static str),
    Io(std::io::Error),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::Transport(error) => {
                error.log();
            }
            Error::InvalidTimeout(path, timeout) => {
                warn!(%path, ?timeout, "{}", self);
            }
            Error::Decode(path, error) => {
                warn!(%path, error = %with_source(error), "{}", self);
            }
            Error::SubscriptionClosed(path) => {
                warn!(%path, "{}", self);
            }
            Error::Encode(path, error) => {
                warn!(%path, error = %with_source(error), "{}", self);
            }
            Error::ConfigPush { index, path, error } => {
                error!(%index, %path, error = %with_source(error), "{}", self);
            }
            Error::InvalidTransition(state, operation) => {
                warn!(?state, ?operation, "{}", self);
            }
            Error::NotConverged => {
                warn!("{}", self);
            }
            Error::UnknownFlow(flow) => {
                warn!(%flow, "{}", self);
            }
            Error::TaskJoin(error) => {
                error!(%error, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Transport(error) => error.fmt(f),
            Error::InvalidTimeout(path, timeout) => {
                write!(f, "invalid timeout {timeout:?} for {path}")
            }
            Error::Decode(path, ..) => {
                write!(f, "failed to decode sample of {path}")
            }
            Error::SubscriptionClosed(path) => {
                write!(f, "subscription to {path} closed unexpectedly")
            }
            Error::Encode(path, ..) => {
                write!(f, "failed to encode configuration for {path}")
            }
            Error::ConfigPush { index, path, .. } => {
                write!(
                    f,
                    "configuration batch aborted at operation {index} ({path})"
                )
            }
            Error::InvalidTransition(state, operation) => {
                write!(f, "cannot {operation} while {state}")
            }
            Error::NotConverged => {
                write!(
                    f,
                    "traffic started before control-plane convergence was confirmed"
                )
            }
            Error::UnknownFlow(flow) => {
                write!(f, "flow {flow} is not part of the pushed topology")
            }
            Error::TaskJoin(..) => {
                write!(f, "watch task failed")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(error) => Some(error),
            Error::Decode(_, error) | Error::Encode(_, error) => Some(error),
            Error::ConfigPush { error, .. } => Some(error),
            Error::TaskJoin(error) => Some(error),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Error {
        Error::Transport(error)
    }
}

// ===== impl TransportError =====

impl TransportError {
    pub fn log(&self) {
        match self {
            TransportError::Unreachable(target) => {
                error!(%target, "{}", self);
            }
            TransportError::Rejected(reason) => {
                error!(%reason, "{}", self);
            }
            TransportError::Unsupported(capability) => {
                warn!(%capability, "{}", self);
            }
            TransportError::Io(error) => {
                error!(error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Unreachable(target) => {
                write!(f, "{target} is unreachable")
            }
            TransportError::Rejected(reason) => {
                write!(f, "request rejected: {reason}")
            }
            TransportError::Unsupported(capability) => {
                write!(f, "{capability} is not supported by the collaborator")
            }
            TransportError::Io(..) => {
                write!(f, "I/O error")
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> TransportError {
        TransportError::Io(error)
    }
}
