//! Edit scheduling for autosync
//!
//! This crate provides:
//! - Per-source debouncing (one pending timer per source, replaced on re-arm)
//! - The continuous/discrete split that decides which edits wait for a quiet
//!   period and which fire immediately

pub mod debounce;

pub use debounce::DebounceScheduler;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a field change was produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Typing and other bursty input; waits for a quiet period
    #[default]
    Continuous,
    /// A single complete decision (checkbox, select); fires immediately
    Discrete,
}

/// Debounce delays per change kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet period for continuous input (default: 300ms)
    pub continuous_ms: u64,
    /// Delay for discrete controls (default: 0, i.e. synchronous)
    pub discrete_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            continuous_ms: 300,
            discrete_ms: 0,
        }
    }
}

impl DebounceConfig {
    pub fn delay_for(&self, kind: ChangeKind) -> Duration {
        match kind {
            ChangeKind::Continuous => Duration::from_millis(self.continuous_ms),
            ChangeKind::Discrete => Duration::from_millis(self.discrete_ms),
        }
    }
}
