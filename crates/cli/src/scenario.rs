//! Scripted autosave scenarios
//!
//! A scenario names one resource, an in-memory server and a timeline of
//! user actions. Running it drives a real hub against [`MemoryTransport`]
//! and records every signal and request with its offset from the start.

use anyhow::{Context, Result};
use autosync_core::{SubmissionKey, VersionToken};
use dispatch::transport::memory::{MemoryTransport, ScriptedFailure};
use dispatch::{AutosaveHub, HubConfig, ResourceSpec, SaveSignal, Session, SignalKind};
use scheduler::{ChangeKind, DebounceConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn default_settle_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub resource: ResourceSpec,
    #[serde(default)]
    pub server: ServerSpec,
    /// Overrides the configured debounce delays
    #[serde(default)]
    pub debounce: Option<DebounceConfig>,
    /// How long to wait for in-flight work after the last event
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerSpec {
    pub latency_ms: u64,
    pub version: u64,
    pub document: Option<Value>,
}

impl ServerSpec {
    fn build(&self, key: &SubmissionKey) -> MemoryTransport {
        let document = self.document.clone().unwrap_or_else(|| json!({}));
        MemoryTransport::new()
            .with_latency(Duration::from_millis(self.latency_ms))
            .with_document(key.clone(), document, self.version)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// A field reported a new value
    Change {
        field: String,
        value: Value,
        #[serde(default)]
        kind: ChangeKind,
    },
    /// Manual save
    Save,
    /// Drop unsaved edits
    Reset,
    /// Reload authoritative state; defaults to the server's current version
    Reload {
        #[serde(default)]
        version: Option<VersionToken>,
    },
    /// Someone else saved the resource
    RemoteEdit { patch: Value },
    /// Make the next request fail
    FailNext { failure: FailureSpec },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSpec {
    Network,
    Server {
        #[serde(default)]
        errors: BTreeMap<String, String>,
    },
}

impl From<FailureSpec> for ScriptedFailure {
    fn from(spec: FailureSpec) -> Self {
        match spec {
            FailureSpec::Network => ScriptedFailure::Network,
            FailureSpec::Server { errors } => ScriptedFailure::Server { errors },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    pub at_ms: u64,
    pub signal: &'static str,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SignalRecord {
    fn new(at_ms: u64, signal: &SaveSignal) -> Self {
        let (version, error) = match &signal.kind {
            SignalKind::Started => (None, None),
            SignalKind::Succeeded { version } | SignalKind::Conflict { version } => {
                (Some(version.to_string()), None)
            }
            SignalKind::Failed { error } => (None, Some(error.to_string())),
        };
        Self {
            at_ms,
            signal: signal.name(),
            key: signal.key.to_string(),
            version,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    pub at_ms: u64,
    pub patch: Value,
    pub version: Option<String>,
}

/// An edit refused by local validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedEdit {
    pub at_ms: u64,
    pub field: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub key: String,
    pub signals: Vec<SignalRecord>,
    pub requests: Vec<RequestRecord>,
    pub rejected: Vec<RejectedEdit>,
    pub document: Value,
    pub server_version: u64,
    pub local_version: Option<String>,
    /// Edits still queued locally when the run ended
    pub pending: usize,
    /// The run stopped waiting before all work settled
    pub timed_out: bool,
}

impl Scenario {
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse scenario")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario: {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid scenario: {}", path.display()))
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn is_idle(hub: &AutosaveHub) -> bool {
    hub.registry().in_flight_count() == 0 && hub.pending_timers() == 0
}

/// Play `scenario` to completion
///
/// Events fire at their offsets; afterwards the run waits until no timer is
/// armed and no request is in flight, or until `settle_ms` passes.
pub async fn run(scenario: Scenario, mut config: HubConfig) -> Result<SimulationReport> {
    if let Some(debounce) = scenario.debounce {
        config.debounce = debounce;
    }

    let key = scenario.resource.key.clone();
    let server = Arc::new(scenario.server.build(&key));
    let hub = AutosaveHub::new(server.clone(), config);
    let mut signals = hub.subscribe();
    let session = hub.attach(scenario.resource.clone());

    let mut events = scenario.events;
    events.sort_by_key(|event| event.at_ms);
    let mut events = events.into_iter().peekable();

    info!(%key, events = events.len(), ?config, "simulation started");

    let start = Instant::now();
    let settle = Duration::from_millis(scenario.settle_ms);
    let mut quiet_since = start;
    let mut records = Vec::new();
    let mut rejected = Vec::new();
    let mut timed_out = false;

    loop {
        let deadline = events
            .peek()
            .map(|event| start + Duration::from_millis(event.at_ms));

        tokio::select! {
            biased;

            received = signals.recv() => match received {
                Ok(signal) => records.push(SignalRecord::new(elapsed_ms(start), &signal)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "signal receiver lagged"),
                Err(RecvError::Closed) => break,
            },

            _ = sleep_until(deadline.unwrap_or(start)), if deadline.is_some() => {
                if let Some(event) = events.next() {
                    let at_ms = elapsed_ms(start);
                    if let Some(edit) = apply(&event.action, &session, &server, at_ms) {
                        rejected.push(edit);
                    }
                    quiet_since = Instant::now();
                }
            }

            _ = sleep(POLL_INTERVAL), if deadline.is_none() => {
                if is_idle(&hub) {
                    break;
                }
                if quiet_since.elapsed() >= settle {
                    warn!(%key, settle_ms = scenario.settle_ms, "gave up waiting for in-flight work");
                    timed_out = true;
                    break;
                }
            }
        }
    }

    while let Ok(signal) = signals.try_recv() {
        records.push(SignalRecord::new(elapsed_ms(start), &signal));
    }

    let requests = server
        .requests()
        .into_iter()
        .filter(|request| request.key == key)
        .map(|request| RequestRecord {
            at_ms: request.received_at.saturating_duration_since(start).as_millis() as u64,
            patch: request.patch,
            version: request.version.map(|v| v.to_string()),
        })
        .collect();

    let report = SimulationReport {
        key: key.to_string(),
        signals: records,
        requests,
        rejected,
        document: server.document(&key).unwrap_or(Value::Null),
        server_version: server.version(&key).unwrap_or(0),
        local_version: session.version().map(|v| v.to_string()),
        pending: session.pending(),
        timed_out,
    };
    session.detach();

    info!(
        %key,
        requests = report.requests.len(),
        signals = report.signals.len(),
        "simulation finished"
    );
    Ok(report)
}

fn apply(
    action: &Action,
    session: &Session,
    server: &MemoryTransport,
    at_ms: u64,
) -> Option<RejectedEdit> {
    match action {
        Action::Change { field, value, kind } => {
            if let Err(error) = session.field_changed(field, value.clone(), *kind) {
                warn!(field = %field, %error, "edit rejected");
                return Some(RejectedEdit {
                    at_ms,
                    field: field.clone(),
                    error: error.to_string(),
                });
            }
        }
        Action::Save => {
            let attempt = session.save_now();
            debug!(started = attempt.is_started(), "manual save");
        }
        Action::Reset => session.reset(),
        Action::Reload { version } => {
            let version = version.clone().unwrap_or_else(|| {
                VersionToken::from(server.version(session.key()).unwrap_or(0))
            });
            session.reload(version);
        }
        Action::RemoteEdit { patch } => {
            let version = server.remote_edit(session.key(), patch);
            debug!(version, "remote edit applied");
        }
        Action::FailNext { failure } => server.fail_next(failure.clone().into()),
    }
    None
}
