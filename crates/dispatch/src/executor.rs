//! Dispatch executor
//!
//! Sends at most one request per key at a time. A dispatch that finds its
//! key busy only flags a replay; the task that owns the key sends once more
//! after its current request completes, carrying whatever accumulated in the
//! meantime. The owning task keeps looping until a completion finds no
//! replay pending, so follow-ups are a continuation of the same task rather
//! than nested callbacks.

use crate::registry::{Acquire, Finish, SubmissionRegistry};
use crate::signal::{SaveOutcome, SaveSignal, SignalBus};
use crate::transport::{PatchRequest, PatchResponse, Transport};
use crate::error::TransportError;
use autosync_core::SubmissionKey;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// The state a dispatch reads from and settles into
pub trait DispatchJob: Send + Sync + 'static {
    /// Whatever `complete` needs to know about what was sent
    type Ticket: Send + 'static;

    /// Build the request from the state as it is right now
    ///
    /// `None` means nothing is pending and no request should be sent.
    fn prepare(&self) -> Option<(PatchRequest, Self::Ticket)>;

    /// Fold the result of a send back into the state
    fn complete(
        &self,
        ticket: Self::Ticket,
        result: Result<PatchResponse, TransportError>,
    ) -> SaveOutcome;
}

/// What `attempt_dispatch` did
#[derive(Debug)]
pub enum Attempt {
    /// A request went out; the handle resolves after the last replay
    Started(DispatchHandle),
    /// The key was busy; one replay is queued behind the current request
    Coalesced,
    /// Nothing was pending
    Empty,
}

impl Attempt {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    pub fn into_handle(self) -> Option<DispatchHandle> {
        match self {
            Self::Started(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Summary of one dispatch chain (initial send plus replays)
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub key: SubmissionKey,
    /// One entry per request sent, in order
    pub outcomes: Vec<SaveOutcome>,
}

impl DispatchReport {
    pub fn sends(&self) -> usize {
        self.outcomes.len()
    }

    pub fn last(&self) -> Option<&SaveOutcome> {
        self.outcomes.last()
    }
}

/// Completion of a started dispatch
#[derive(Debug)]
pub struct DispatchHandle {
    key: SubmissionKey,
    task: JoinHandle<DispatchReport>,
}

impl DispatchHandle {
    pub fn key(&self) -> &SubmissionKey {
        &self.key
    }

    /// Wait for the chain to finish
    ///
    /// Fails only if the task panicked; the key has been released either way.
    pub async fn join(self) -> Result<DispatchReport, JoinError> {
        self.task.await
    }
}

/// Returns the key to idle if a chain ends without reaching its normal exit
struct LockGuard {
    registry: Arc<SubmissionRegistry>,
    key: SubmissionKey,
    armed: bool,
}

impl LockGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(key = %self.key, "dispatch aborted, releasing lock");
            self.registry.release(&self.key);
        }
    }
}

/// Serializes sends per key
#[derive(Clone)]
pub struct DispatchExecutor {
    registry: Arc<SubmissionRegistry>,
    transport: Arc<dyn Transport>,
    signals: SignalBus,
}

impl DispatchExecutor {
    pub fn new(
        registry: Arc<SubmissionRegistry>,
        transport: Arc<dyn Transport>,
        signals: SignalBus,
    ) -> Self {
        Self {
            registry,
            transport,
            signals,
        }
    }

    pub fn registry(&self) -> &Arc<SubmissionRegistry> {
        &self.registry
    }

    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    /// Send `job`'s pending state for `key`, or queue a replay if busy
    ///
    /// Must be called from within a tokio runtime.
    pub fn attempt_dispatch<J: DispatchJob>(&self, key: &SubmissionKey, job: Arc<J>) -> Attempt {
        if self.registry.try_acquire(key) == Acquire::Coalesced {
            return Attempt::Coalesced;
        }

        // Armed before the first prepare so a panicking job cannot wedge the key
        let guard = LockGuard {
            registry: Arc::clone(&self.registry),
            key: key.clone(),
            armed: true,
        };

        let first = match job.prepare() {
            Some(first) => first,
            None => match next_request(&self.registry, key, job.as_ref()) {
                Some(next) => next,
                None => {
                    // `finish` already returned the key to idle
                    guard.disarm();
                    debug!(%key, "nothing to dispatch");
                    return Attempt::Empty;
                }
            },
        };

        let task = tokio::spawn(run_chain(
            guard,
            Arc::clone(&self.transport),
            self.signals.clone(),
            job,
            first,
        ));

        Attempt::Started(DispatchHandle {
            key: key.clone(),
            task,
        })
    }
}

/// Finish the current send and, if a replay is pending, build the next one
///
/// An empty replay returns the key to idle.
fn next_request<J: DispatchJob>(
    registry: &SubmissionRegistry,
    key: &SubmissionKey,
    job: &J,
) -> Option<(PatchRequest, J::Ticket)> {
    loop {
        match registry.finish(key) {
            Finish::Idle => return None,
            Finish::Replay => {
                if let Some(next) = job.prepare() {
                    return Some(next);
                }
                debug!(%key, "replay found nothing pending");
            }
        }
    }
}

async fn run_chain<J: DispatchJob>(
    guard: LockGuard,
    transport: Arc<dyn Transport>,
    signals: SignalBus,
    job: Arc<J>,
    first: (PatchRequest, J::Ticket),
) -> DispatchReport {
    let key = guard.key.clone();
    let mut report = DispatchReport {
        key: key.clone(),
        outcomes: Vec::new(),
    };

    let mut next = Some(first);
    while let Some((request, ticket)) = next.take() {
        signals.emit(SaveSignal::started(&key));
        debug!(%key, version = ?request.version, "sending patch");

        let result = transport.send(&request).await;
        let outcome = job.complete(ticket, result);
        match &outcome {
            SaveOutcome::Saved { version } => info!(%key, %version, "saved"),
            SaveOutcome::Rejected(error) => warn!(%key, %error, "save rejected"),
        }
        signals.emit(SaveSignal::from_outcome(&key, &outcome));
        report.outcomes.push(outcome);

        next = next_request(&guard.registry, &key, job.as_ref());
    }

    guard.disarm();
    report
}
