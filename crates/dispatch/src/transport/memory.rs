//! In-memory transport
//!
//! A stand-in server for tests and the CLI simulator. Each resource holds a
//! JSON document and a numeric version. A request whose version does not
//! match is answered with `conflict`; otherwise the patch is merged and the
//! version bumped. Objects merge per RFC 7396 (`null` deletes a member);
//! arrays merge element-wise with `null` elements leaving the existing
//! element untouched, matching how indexed field paths pad skipped slots.

use super::{PatchRequest, PatchResponse, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use autosync_core::{MergePatch, SubmissionKey, VersionToken};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// One-shot failure injected ahead of normal handling
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedFailure {
    /// Drop the request without a response
    Network,
    /// Answer `error` with field messages
    Server { errors: BTreeMap<String, String> },
}

/// A request as the server saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub key: SubmissionKey,
    pub patch: MergePatch,
    pub version: Option<VersionToken>,
    pub received_at: Instant,
}

#[derive(Debug, Clone)]
struct Document {
    value: Value,
    version: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            value: Value::Object(Map::new()),
            version: 0,
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    documents: HashMap<SubmissionKey, Document>,
    scripted: VecDeque<ScriptedFailure>,
    requests: Vec<RecordedRequest>,
    in_flight: HashMap<SubmissionKey, usize>,
    peak_in_flight: HashMap<SubmissionKey, usize>,
}

/// In-process server double
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<ServerState>,
    latency: Duration,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed a resource document
    pub fn with_document(self, key: impl Into<SubmissionKey>, value: Value, version: u64) -> Self {
        self.state
            .lock()
            .documents
            .insert(key.into(), Document { value, version });
        self
    }

    /// Queue a failure for the next request (any key)
    pub fn fail_next(&self, failure: ScriptedFailure) {
        self.state.lock().scripted.push_back(failure);
    }

    /// Simulate a concurrent edit from elsewhere
    pub fn remote_edit(&self, key: &SubmissionKey, patch: &Value) -> u64 {
        let mut state = self.state.lock();
        let doc = state.documents.entry(key.clone()).or_default();
        apply_merge_patch(&mut doc.value, patch);
        doc.version += 1;
        doc.version
    }

    pub fn document(&self, key: &SubmissionKey) -> Option<Value> {
        self.state.lock().documents.get(key).map(|d| d.value.clone())
    }

    pub fn version(&self, key: &SubmissionKey) -> Option<u64> {
        self.state.lock().documents.get(key).map(|d| d.version)
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Highest number of simultaneously outstanding requests seen for `key`
    pub fn peak_in_flight(&self, key: &SubmissionKey) -> usize {
        self.state
            .lock()
            .peak_in_flight
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    fn handle(&self, request: &PatchRequest) -> Result<PatchResponse, TransportError> {
        let mut state = self.state.lock();

        if let Some(failure) = state.scripted.pop_front() {
            return match failure {
                ScriptedFailure::Network => Err(TransportError::Unreachable(format!(
                    "connection to {} reset",
                    request.key
                ))),
                ScriptedFailure::Server { errors } => {
                    let version = state
                        .documents
                        .get(&request.key)
                        .map(|d| d.version)
                        .unwrap_or(0);
                    Ok(PatchResponse {
                        message: Some("validation failed".to_string()),
                        ..PatchResponse::error(version, errors)
                    })
                }
            };
        }

        let doc = state.documents.entry(request.key.clone()).or_default();
        if let Some(expected) = &request.version {
            if expected.as_str() != doc.version.to_string() {
                return Ok(PatchResponse::conflict(doc.version));
            }
        }

        apply_merge_patch(&mut doc.value, &request.patch);
        doc.version += 1;
        Ok(PatchResponse::ok(doc.version))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, request: &PatchRequest) -> Result<PatchResponse, TransportError> {
        {
            let mut state = self.state.lock();
            state.requests.push(RecordedRequest {
                key: request.key.clone(),
                patch: request.patch.clone(),
                version: request.version.clone(),
                received_at: Instant::now(),
            });
            let current = {
                let count = state.in_flight.entry(request.key.clone()).or_insert(0);
                *count += 1;
                *count
            };
            let peak = state.peak_in_flight.entry(request.key.clone()).or_insert(0);
            *peak = (*peak).max(current);
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let response = self.handle(request);

        if let Some(count) = self.state.lock().in_flight.get_mut(&request.key) {
            *count = count.saturating_sub(1);
        }
        response
    }
}

/// Merge `patch` into `target`
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(members) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(existing) = target {
                for (name, value) in members {
                    if value.is_null() {
                        existing.remove(name);
                    } else {
                        let slot = existing.entry(name.clone()).or_insert(Value::Null);
                        apply_merge_patch(slot, value);
                    }
                }
            }
        }
        Value::Array(items) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(existing) = target {
                if existing.len() < items.len() {
                    existing.resize(items.len(), Value::Null);
                }
                for (slot, value) in existing.iter_mut().zip(items) {
                    if !value.is_null() {
                        apply_merge_patch(slot, value);
                    }
                }
            }
        }
        _ => *target = patch.clone(),
    }
}
