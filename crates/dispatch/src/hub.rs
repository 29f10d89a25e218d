//! Autosave hub
//!
//! Owns everything that must outlive a single UI component: the lock
//! registry, the per-key resource state, the debounce timers and the signal
//! channel. Components attach to the hub and get a [`Session`]; several
//! sessions for the same key share one resource state and one lock.

use crate::executor::{Attempt, DispatchExecutor};
use crate::registry::SubmissionRegistry;
use crate::resource::ResourceState;
use crate::session::Session;
use crate::signal::{SaveSignal, SignalBus};
use crate::transport::Transport;
use autosync_core::{Schema, SubmissionKey, VersionToken};
use dashmap::DashMap;
use scheduler::{DebounceConfig, DebounceScheduler};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use ulid::Ulid;

/// Debounce timers are keyed per resource and per attached session
pub(crate) type TimerId = (SubmissionKey, Ulid);

/// Hub settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub debounce: DebounceConfig,
    /// Buffered signals per subscriber before the slowest one lags
    pub signal_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            debounce: DebounceConfig::default(),
            signal_capacity: 256,
        }
    }
}

/// What a container declares about the resource it edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub key: SubmissionKey,
    #[serde(default)]
    pub initial_version: Option<VersionToken>,
    #[serde(default)]
    pub schema: Schema,
}

impl ResourceSpec {
    pub fn new(key: impl Into<SubmissionKey>, initial_version: Option<VersionToken>, schema: Schema) -> Self {
        Self {
            key: key.into(),
            initial_version,
            schema,
        }
    }
}

struct HubInner {
    config: HubConfig,
    executor: DispatchExecutor,
    scheduler: DebounceScheduler<TimerId>,
    resources: DashMap<SubmissionKey, Arc<ResourceState>>,
}

/// Shared coordination service; cheap to clone
#[derive(Clone)]
pub struct AutosaveHub {
    inner: Arc<HubInner>,
}

impl AutosaveHub {
    /// Hub with its own lock registry
    pub fn new(transport: Arc<dyn Transport>, config: HubConfig) -> Self {
        Self::with_registry(transport, Arc::new(SubmissionRegistry::new()), config)
    }

    /// Hub sharing an existing lock registry
    pub fn with_registry(
        transport: Arc<dyn Transport>,
        registry: Arc<SubmissionRegistry>,
        config: HubConfig,
    ) -> Self {
        let signals = SignalBus::new(config.signal_capacity);
        Self {
            inner: Arc::new(HubInner {
                config,
                executor: DispatchExecutor::new(registry, transport, signals),
                scheduler: DebounceScheduler::new(),
                resources: DashMap::new(),
            }),
        }
    }

    /// Attach a component editing `spec.key`
    ///
    /// The resource state is created on first attach. Later attaches reuse
    /// it, keeping its pending edits and version; their `initial_version`
    /// is ignored because the existing state is at least as fresh.
    pub fn attach(&self, spec: ResourceSpec) -> Session {
        let resource = self
            .inner
            .resources
            .entry(spec.key.clone())
            .or_insert_with(|| {
                debug!(key = %spec.key, version = ?spec.initial_version, "resource created");
                Arc::new(ResourceState::new(spec.key.clone(), spec.initial_version.clone()))
            })
            .value()
            .clone();

        Session::new(self.clone(), resource, Arc::new(spec.schema))
    }

    pub fn resource(&self, key: &SubmissionKey) -> Option<Arc<ResourceState>> {
        self.inner.resources.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Dispatch whatever is pending for `key` right now
    pub fn dispatch(&self, key: &SubmissionKey) -> Attempt {
        match self.resource(key) {
            Some(resource) => self.dispatch_resource(&resource),
            None => Attempt::Empty,
        }
    }

    pub(crate) fn dispatch_resource(&self, resource: &Arc<ResourceState>) -> Attempt {
        self.inner
            .executor
            .attempt_dispatch(resource.key(), Arc::clone(resource))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SaveSignal> {
        self.inner.executor.signals().subscribe()
    }

    pub fn registry(&self) -> &Arc<SubmissionRegistry> {
        self.inner.executor.registry()
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Debounce timers currently armed across all sessions
    pub fn pending_timers(&self) -> usize {
        self.inner.scheduler.pending_count()
    }

    pub(crate) fn scheduler(&self) -> &DebounceScheduler<TimerId> {
        &self.inner.scheduler
    }
}
