//! Save signals
//!
//! Observers (status badges, toasts, a "please refresh" banner) subscribe to
//! a broadcast channel instead of reaching into the components that save.

use crate::error::SaveError;
use autosync_core::{SubmissionKey, VersionToken};
use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

/// Result of one completed send
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved { version: VersionToken },
    Rejected(SaveError),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// What happened to a key
#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    Started,
    Succeeded { version: VersionToken },
    Conflict { version: VersionToken },
    Failed { error: SaveError },
}

/// Emitted on every dispatch transition
#[derive(Debug, Clone, PartialEq)]
pub struct SaveSignal {
    pub key: SubmissionKey,
    pub kind: SignalKind,
}

impl SaveSignal {
    pub fn started(key: &SubmissionKey) -> Self {
        Self {
            key: key.clone(),
            kind: SignalKind::Started,
        }
    }

    pub fn from_outcome(key: &SubmissionKey, outcome: &SaveOutcome) -> Self {
        let kind = match outcome {
            SaveOutcome::Saved { version } => SignalKind::Succeeded {
                version: version.clone(),
            },
            SaveOutcome::Rejected(SaveError::Conflict { server_version }) => SignalKind::Conflict {
                version: server_version.clone(),
            },
            SaveOutcome::Rejected(error) => SignalKind::Failed {
                error: error.clone(),
            },
        };
        Self {
            key: key.clone(),
            kind,
        }
    }

    /// Event name as seen by the view layer
    pub fn name(&self) -> &'static str {
        match self.kind {
            SignalKind::Started => "save-started",
            SignalKind::Succeeded { .. } => "save-succeeded",
            SignalKind::Conflict { .. } => "save-conflict",
            SignalKind::Failed { .. } => "save-failed",
        }
    }
}

impl fmt::Display for SaveSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.key)?;
        match &self.kind {
            SignalKind::Started => Ok(()),
            SignalKind::Succeeded { version } | SignalKind::Conflict { version } => {
                write!(f, " version={}", version)
            }
            SignalKind::Failed { error } => write!(f, " error=\"{}\"", error),
        }
    }
}

/// Broadcast channel for save signals
///
/// Emitting without subscribers is not an error.
#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<SaveSignal>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, signal: SaveSignal) {
        trace!(%signal, "emit");
        let _ = self.tx.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SaveSignal> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[test]
    fn test_outcome_maps_to_signal_names() {
        let key = SubmissionKey::from("k");
        let saved = SaveOutcome::Saved {
            version: VersionToken::from(2u64),
        };
        let conflict = SaveOutcome::Rejected(SaveError::Conflict {
            server_version: VersionToken::from(7u64),
        });
        let failed = SaveOutcome::Rejected(SaveError::Network(TransportError::Timeout));

        assert_eq!(SaveSignal::started(&key).name(), "save-started");
        assert_eq!(SaveSignal::from_outcome(&key, &saved).name(), "save-succeeded");
        assert_eq!(SaveSignal::from_outcome(&key, &conflict).name(), "save-conflict");
        assert_eq!(SaveSignal::from_outcome(&key, &failed).name(), "save-failed");
        assert_eq!(
            SaveSignal::from_outcome(&key, &conflict).to_string(),
            "save-conflict k version=7"
        );
    }

    #[tokio::test]
    async fn test_bus_delivers_to_subscribers() {
        let bus = SignalBus::new(8);
        bus.emit(SaveSignal::started(&"lost".into()));

        let mut rx = bus.subscribe();
        bus.emit(SaveSignal::started(&"k".into()));
        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.key.as_str(), "k");
    }
}
