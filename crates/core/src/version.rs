//! Optimistic version tracking

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Server-issued marker of the last confirmed state
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionToken({})", self.0)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for VersionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for VersionToken {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Tracks the version token of one resource
///
/// The token is only written on a confirmed save, on a conflict (the
/// server's token is adopted) or when the caller reloads authoritative
/// state.
#[derive(Debug, Clone, Default)]
pub struct VersionGuard {
    current: Option<VersionToken>,
    stale: bool,
    conflicts: u64,
}

impl VersionGuard {
    pub fn new(initial: Option<VersionToken>) -> Self {
        Self {
            current: initial,
            stale: false,
            conflicts: 0,
        }
    }

    /// Token to attach to the next dispatch
    pub fn current(&self) -> Option<&VersionToken> {
        self.current.as_ref()
    }

    /// Adopt the token returned with a successful save
    pub fn confirm(&mut self, token: VersionToken) {
        debug!(from = ?self.current, to = %token, "version confirmed");
        self.current = Some(token);
    }

    /// Adopt the server's token after a rejected, out-of-date save
    ///
    /// Marks the local view stale until [`VersionGuard::reload`] is called.
    pub fn conflict(&mut self, server: VersionToken) {
        debug!(from = ?self.current, to = %server, "version conflict");
        self.current = Some(server);
        self.stale = true;
        self.conflicts += 1;
    }

    /// The caller reloaded authoritative state at `token`
    pub fn reload(&mut self, token: VersionToken) {
        self.current = Some(token);
        self.stale = false;
    }

    /// True between a conflict and the next reload
    ///
    /// Advisory only: it tells the view to reload, it does not hold back
    /// dispatch. Edits recorded after a conflict are sent against the
    /// adopted server token, and a successful save of them leaves the flag
    /// set until [`VersionGuard::reload`].
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts
    }
}
