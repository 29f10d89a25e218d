//! Per-component autosave session
//!
//! The view layer reports explicit field changes here. A session owns its
//! debounce timer and nothing else: pending edits, the version guard and the
//! lock live with the hub, so detaching a session never cancels or
//! duplicates a request that is already out.

use crate::error::SaveError;
use crate::executor::Attempt;
use crate::hub::{AutosaveHub, TimerId};
use crate::resource::ResourceState;
use crate::Result;
use autosync_core::{FieldPath, MergePatch, Schema, SubmissionKey, VersionToken};
use scheduler::ChangeKind;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use ulid::Ulid;

/// Handle held by one UI component
pub struct Session {
    hub: AutosaveHub,
    resource: Arc<ResourceState>,
    schema: Arc<Schema>,
    id: Ulid,
}

impl Session {
    pub(crate) fn new(hub: AutosaveHub, resource: Arc<ResourceState>, schema: Arc<Schema>) -> Self {
        let id = Ulid::new();
        debug!(key = %resource.key(), session = %id, "session attached");
        Self {
            hub,
            resource,
            schema,
            id,
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn key(&self) -> &SubmissionKey {
        self.resource.key()
    }

    fn timer_id(&self) -> TimerId {
        (self.resource.key().clone(), self.id)
    }

    /// A field reported a new raw value
    ///
    /// The value is coerced to the field's declared type first; a rejected
    /// value comes back as [`SaveError::Validation`] and leaves every pending
    /// edit alone. Accepted values arm the debounce timer (continuous input)
    /// or dispatch immediately (discrete controls, with the default config).
    pub fn field_changed(&self, path: &str, raw: Value, kind: ChangeKind) -> Result<()> {
        let path = FieldPath::parse(path).map_err(|e| SaveError::Validation(e.into()))?;
        let value = self.schema.coerce(&path, &raw)?;
        self.resource.record(path, value);

        let delay = self.hub.config().debounce.delay_for(kind);
        let hub = self.hub.clone();
        let resource = Arc::clone(&self.resource);
        self.hub.scheduler().schedule(self.timer_id(), delay, move || {
            hub.dispatch_resource(&resource);
        });
        Ok(())
    }

    /// Manual save: skip the quiet period and dispatch now
    pub fn save_now(&self) -> Attempt {
        self.hub.scheduler().cancel(&self.timer_id());
        self.hub.dispatch_resource(&self.resource)
    }

    /// Forget unsaved edits and the pending timer
    pub fn reset(&self) {
        self.hub.scheduler().cancel(&self.timer_id());
        self.resource.clear();
    }

    /// The component reloaded authoritative state at `version`
    pub fn reload(&self, version: VersionToken) {
        self.hub.scheduler().cancel(&self.timer_id());
        self.resource.reload(version);
    }

    /// The component is going away
    ///
    /// Cancels this session's timer. A request already in flight completes
    /// and releases its lock regardless; edits still pending stay queued for
    /// the next dispatch of this key.
    pub fn detach(self) {
        let cancelled = self.hub.scheduler().cancel(&self.timer_id());
        debug!(key = %self.key(), session = %self.id, cancelled, "session detached");
    }

    pub fn has_pending_timer(&self) -> bool {
        self.hub.scheduler().is_pending(&self.timer_id())
    }

    pub fn pending(&self) -> usize {
        self.resource.pending_len()
    }

    pub fn preview(&self) -> Option<MergePatch> {
        self.resource.preview()
    }

    pub fn version(&self) -> Option<VersionToken> {
        self.resource.version()
    }

    /// True after a conflict until [`Session::reload`]
    pub fn is_stale(&self) -> bool {
        self.resource.is_stale()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}
