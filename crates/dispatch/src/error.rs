//! Save error taxonomy

use autosync_core::{ValidationError, VersionToken};
use std::collections::BTreeMap;
use thiserror::Error;

/// The request never produced a response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("resource unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    InvalidResponse(String),
}

/// Why a change did not become confirmed server state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveError {
    /// Rejected locally; never reached the network
    #[error("invalid field value: {0}")]
    Validation(#[from] ValidationError),

    /// No response received; the patch stays queued
    #[error("network failure: {0}")]
    Network(#[from] TransportError),

    /// The server holds a newer version; the local patch was discarded
    #[error("stale version, server is at {server_version}")]
    Conflict { server_version: VersionToken },

    /// The server answered and rejected the patch; the patch stays queued
    #[error("server rejected the update: {}", describe_server(.message, .errors))]
    Server {
        message: Option<String>,
        errors: BTreeMap<String, String>,
    },
}

impl SaveError {
    /// True when the unsent patch was kept for the next dispatch
    pub fn retains_patch(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }

    /// Per-field messages for inline display
    pub fn field_errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Server { errors, .. } if !errors.is_empty() => Some(errors),
            _ => None,
        }
    }
}

fn describe_server(message: &Option<String>, errors: &BTreeMap<String, String>) -> String {
    let fields = errors
        .iter()
        .map(|(path, msg)| format!("{}: {}", path, msg))
        .collect::<Vec<_>>()
        .join("; ");

    match (message, fields.is_empty()) {
        (Some(message), true) => message.clone(),
        (Some(message), false) => format!("{} ({})", message, fields),
        (None, false) => fields,
        (None, true) => "no details".to_string(),
    }
}
