//! Shared per-resource state
//!
//! Pending edits and the version guard of one submission key. Every session
//! attached to the key records into the same state, and a dispatch chain
//! reads from it at send time, so a replay always carries edits made by any
//! session, including one attached after the chain started.

use crate::error::{SaveError, TransportError};
use crate::executor::DispatchJob;
use crate::signal::SaveOutcome;
use crate::transport::{PatchRequest, PatchResponse, ResponseStatus};
use autosync_core::{
    CapturedPatch, ChangeAccumulator, FieldPath, MergePatch, SubmissionKey, VersionGuard,
    VersionToken,
};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug)]
struct Inner {
    accumulator: ChangeAccumulator,
    version: VersionGuard,
}

/// Pending edits plus version guard for one key
#[derive(Debug)]
pub struct ResourceState {
    key: SubmissionKey,
    inner: Mutex<Inner>,
}

impl ResourceState {
    pub fn new(key: SubmissionKey, initial_version: Option<VersionToken>) -> Self {
        Self {
            key,
            inner: Mutex::new(Inner {
                accumulator: ChangeAccumulator::new(),
                version: VersionGuard::new(initial_version),
            }),
        }
    }

    pub fn key(&self) -> &SubmissionKey {
        &self.key
    }

    /// Queue an already-coerced value
    pub fn record(&self, path: FieldPath, value: Value) {
        self.inner.lock().accumulator.record(path, value);
    }

    /// The patch the next dispatch would send
    pub fn preview(&self) -> Option<MergePatch> {
        self.inner.lock().accumulator.build()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().accumulator.len()
    }

    pub fn pending_value(&self, path: &FieldPath) -> Option<Value> {
        self.inner.lock().accumulator.get(path).cloned()
    }

    pub fn version(&self) -> Option<VersionToken> {
        self.inner.lock().version.current().cloned()
    }

    pub fn is_stale(&self) -> bool {
        self.inner.lock().version.is_stale()
    }

    pub fn conflicts(&self) -> u64 {
        self.inner.lock().version.conflicts()
    }

    /// Drop pending edits at or below `paths`
    pub fn discard(&self, paths: &[FieldPath]) -> usize {
        self.inner.lock().accumulator.discard(paths)
    }

    /// Drop every pending edit
    pub fn clear(&self) {
        self.inner.lock().accumulator.clear();
    }

    /// The caller loaded authoritative state at `version`
    ///
    /// Pending edits were made against the old state and are dropped.
    pub fn reload(&self, version: VersionToken) {
        let mut inner = self.inner.lock();
        inner.accumulator.clear();
        inner.version.reload(version);
    }
}

impl DispatchJob for ResourceState {
    type Ticket = CapturedPatch;

    /// Attaches the current token even while stale; see [`VersionGuard::is_stale`]
    fn prepare(&self) -> Option<(PatchRequest, CapturedPatch)> {
        let inner = self.inner.lock();
        let captured = inner.accumulator.capture()?;
        let request = PatchRequest {
            key: self.key.clone(),
            patch: captured.patch.clone(),
            version: inner.version.current().cloned(),
        };
        Some((request, captured))
    }

    fn complete(
        &self,
        captured: CapturedPatch,
        result: Result<PatchResponse, TransportError>,
    ) -> SaveOutcome {
        let mut inner = self.inner.lock();

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                warn!(key = %self.key, %error, pending = inner.accumulator.len(), "no response, keeping patch");
                return SaveOutcome::Rejected(SaveError::Network(error));
            }
        };

        match response.status {
            ResponseStatus::Ok => {
                let settled = inner.accumulator.settle(&captured);
                debug!(key = %self.key, settled, remaining = inner.accumulator.len(), "patch confirmed");
                inner.version.confirm(response.version.clone());
                SaveOutcome::Saved {
                    version: response.version,
                }
            }
            ResponseStatus::Conflict => {
                // Everything queued was built on the stale version
                let dropped = inner.accumulator.len();
                inner.accumulator.clear();
                inner.version.conflict(response.version.clone());
                warn!(key = %self.key, dropped, server = %response.version, "version conflict, local patch discarded");
                SaveOutcome::Rejected(SaveError::Conflict {
                    server_version: response.version,
                })
            }
            ResponseStatus::Error => {
                warn!(key = %self.key, errors = response.errors.len(), "server rejected patch, keeping it");
                SaveOutcome::Rejected(SaveError::Server {
                    message: response.message,
                    errors: response.errors,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn path(p: &str) -> FieldPath {
        FieldPath::parse(p).unwrap()
    }

    fn resource(version: u64) -> ResourceState {
        ResourceState::new(SubmissionKey::from("k"), Some(VersionToken::from(version)))
    }

    #[test]
    fn test_prepare_attaches_current_version() {
        let state = resource(5);
        assert!(state.prepare().is_none());

        state.record(path("a"), json!(1));
        let (request, _) = state.prepare().unwrap();
        assert_eq!(request.patch, json!({ "a": 1 }));
        assert_eq!(request.version, Some(VersionToken::from(5u64)));
    }

    #[test]
    fn test_success_settles_and_adopts_version() {
        let state = resource(5);
        state.record(path("a"), json!(1));
        let (_, ticket) = state.prepare().unwrap();
        state.record(path("b"), json!(2));

        let outcome = state.complete(ticket, Ok(PatchResponse::ok(6u64)));
        assert!(outcome.is_saved());
        assert_eq!(state.version(), Some(VersionToken::from(6u64)));
        assert_eq!(state.preview(), Some(json!({ "b": 2 })));
    }

    #[test]
    fn test_conflict_discards_patch_and_adopts_server_token() {
        let state = resource(5);
        state.record(path("a"), json!(1));
        let (_, ticket) = state.prepare().unwrap();

        let outcome = state.complete(ticket, Ok(PatchResponse::conflict(7u64)));
        assert_eq!(
            outcome,
            SaveOutcome::Rejected(SaveError::Conflict {
                server_version: VersionToken::from(7u64)
            })
        );
        assert_eq!(state.pending_len(), 0);
        assert_eq!(state.version(), Some(VersionToken::from(7u64)));
        assert!(state.is_stale());

        state.reload(VersionToken::from(7u64));
        assert!(!state.is_stale());
    }

    #[test]
    fn test_failures_retain_patch() {
        let state = resource(5);
        state.record(path("a"), json!(1));

        let (_, ticket) = state.prepare().unwrap();
        let outcome = state.complete(ticket, Err(TransportError::Timeout));
        assert!(!outcome.is_saved());
        assert_eq!(state.preview(), Some(json!({ "a": 1 })));

        let mut errors = BTreeMap::new();
        errors.insert("a".to_string(), "must be positive".to_string());
        let (_, ticket) = state.prepare().unwrap();
        let outcome = state.complete(ticket, Ok(PatchResponse::error(5u64, errors)));
        match outcome {
            SaveOutcome::Rejected(error) => {
                assert!(error.retains_patch());
                assert_eq!(error.field_errors().map(|e| e.len()), Some(1));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(state.preview(), Some(json!({ "a": 1 })));
        assert_eq!(state.version(), Some(VersionToken::from(5u64)));
    }
}
