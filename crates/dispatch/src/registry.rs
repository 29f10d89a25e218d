//! Submission key registry
//!
//! Lock state per logical resource. A key is created lazily on first use
//! and kept for the registry's lifetime, independent of whichever session
//! started the dispatch.

use autosync_core::SubmissionKey;
use dashmap::DashMap;
use tracing::{debug, warn};

/// Whether a key has a request outstanding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    InFlight,
}

/// Lock state of one key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockState {
    pub phase: Phase,
    /// Set when a dispatch was requested while in flight
    pub pending_replay: bool,
}

/// Result of asking for the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// Idle → in flight; the caller owns the dispatch
    Acquired,
    /// Already in flight; replay was requested instead
    Coalesced,
}

/// Result of finishing one send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// Back to idle
    Idle,
    /// Replay was pending; still in flight, the caller must send again
    Replay,
}

/// Lock table keyed by submission key
#[derive(Debug, Default)]
pub struct SubmissionRegistry {
    locks: DashMap<SubmissionKey, LockState>,
}

impl SubmissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or record that a replay is wanted
    pub fn try_acquire(&self, key: &SubmissionKey) -> Acquire {
        let mut state = self.locks.entry(key.clone()).or_default();
        match state.phase {
            Phase::Idle => {
                state.phase = Phase::InFlight;
                state.pending_replay = false;
                debug!(%key, "lock acquired");
                Acquire::Acquired
            }
            Phase::InFlight => {
                state.pending_replay = true;
                debug!(%key, "dispatch coalesced into pending replay");
                Acquire::Coalesced
            }
        }
    }

    /// Called after a send's completion handler ran
    ///
    /// Consumes a pending replay by staying in flight; otherwise returns the
    /// key to idle.
    pub fn finish(&self, key: &SubmissionKey) -> Finish {
        let Some(mut state) = self.locks.get_mut(key) else {
            warn!(%key, "finish on unknown key");
            return Finish::Idle;
        };

        match (state.phase, state.pending_replay) {
            (Phase::InFlight, true) => {
                state.pending_replay = false;
                debug!(%key, "replaying coalesced dispatch");
                Finish::Replay
            }
            (Phase::InFlight, false) => {
                state.phase = Phase::Idle;
                debug!(%key, "lock released");
                Finish::Idle
            }
            (Phase::Idle, _) => {
                warn!(%key, "finish on idle key");
                Finish::Idle
            }
        }
    }

    /// Force a key back to idle, dropping any pending replay
    pub fn release(&self, key: &SubmissionKey) {
        if let Some(mut state) = self.locks.get_mut(key) {
            *state = LockState::default();
        }
    }

    pub fn state(&self, key: &SubmissionKey) -> LockState {
        self.locks.get(key).map(|s| *s).unwrap_or_default()
    }

    pub fn is_in_flight(&self, key: &SubmissionKey) -> bool {
        self.state(key).phase == Phase::InFlight
    }

    pub fn in_flight_count(&self) -> usize {
        self.locks
            .iter()
            .filter(|entry| entry.phase == Phase::InFlight)
            .count()
    }

    /// Number of keys ever seen
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Forget every idle key
    ///
    /// Keys with a dispatch in flight are kept so their chain still owns the
    /// lock; returns how many keys were dropped.
    pub fn reset(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, state| state.phase == Phase::InFlight);
        before - self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_dispatch_release() {
        let registry = SubmissionRegistry::new();
        let key = SubmissionKey::from("/api/personas/1");

        assert_eq!(registry.state(&key), LockState::default());
        assert_eq!(registry.try_acquire(&key), Acquire::Acquired);
        assert!(registry.is_in_flight(&key));

        assert_eq!(registry.finish(&key), Finish::Idle);
        assert_eq!(registry.state(&key).phase, Phase::Idle);
    }

    #[test]
    fn test_busy_key_coalesces_into_one_replay() {
        let registry = SubmissionRegistry::new();
        let key = SubmissionKey::from("K");

        assert_eq!(registry.try_acquire(&key), Acquire::Acquired);
        for _ in 0..5 {
            assert_eq!(registry.try_acquire(&key), Acquire::Coalesced);
        }
        assert!(registry.state(&key).pending_replay);

        // in flight → in flight once, then idle
        assert_eq!(registry.finish(&key), Finish::Replay);
        assert!(registry.is_in_flight(&key));
        assert!(!registry.state(&key).pending_replay);
        assert_eq!(registry.finish(&key), Finish::Idle);
        assert!(!registry.is_in_flight(&key));
    }

    #[test]
    fn test_keys_are_independent() {
        let registry = SubmissionRegistry::new();
        let a = SubmissionKey::from("a");
        let b = SubmissionKey::from("b");

        assert_eq!(registry.try_acquire(&a), Acquire::Acquired);
        assert_eq!(registry.try_acquire(&b), Acquire::Acquired);
        assert_eq!(registry.in_flight_count(), 2);
        assert!(!registry.state(&b).pending_replay);
    }

    #[test]
    fn test_release_and_reset() {
        let registry = SubmissionRegistry::new();
        let key = SubmissionKey::from("k");

        registry.try_acquire(&key);
        registry.try_acquire(&key);
        registry.release(&key);
        assert_eq!(registry.state(&key), LockState::default());
        assert_eq!(registry.try_acquire(&key), Acquire::Acquired);

        assert_eq!(registry.finish(&key), Finish::Idle);
        assert_eq!(registry.reset(), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.finish(&key), Finish::Idle);
    }

    #[test]
    fn test_reset_keeps_in_flight_keys() {
        let registry = SubmissionRegistry::new();
        let busy = SubmissionKey::from("busy");
        let idle = SubmissionKey::from("idle");

        registry.try_acquire(&busy);
        registry.try_acquire(&idle);
        registry.finish(&idle);

        assert_eq!(registry.reset(), 1);
        assert!(registry.is_in_flight(&busy));
        assert_eq!(registry.try_acquire(&busy), Acquire::Coalesced);
        assert_eq!(registry.in_flight_count(), 1);
    }
}
