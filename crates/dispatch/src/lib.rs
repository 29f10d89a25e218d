//! Submission coordination for autosync
//!
//! This crate provides:
//! - The submission key registry (one in-flight dispatch per key)
//! - The dispatch executor with coalesced replay
//! - The transport seam and its wire types
//! - Save signals broadcast to observers
//! - Shared per-resource state (pending edits + version guard)
//! - The autosave hub and the per-component sessions attached to it

pub mod error;
pub mod executor;
pub mod hub;
pub mod registry;
pub mod resource;
pub mod session;
pub mod signal;
pub mod transport;

// Re-exports
pub use error::{SaveError, TransportError};
pub use executor::{Attempt, DispatchExecutor, DispatchHandle, DispatchJob, DispatchReport};
pub use hub::{AutosaveHub, HubConfig, ResourceSpec};
pub use registry::{LockState, Phase, SubmissionRegistry};
pub use resource::ResourceState;
pub use session::Session;
pub use signal::{SaveOutcome, SaveSignal, SignalKind};
pub use transport::{PatchRequest, PatchResponse, ResponseStatus, Transport};

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, SaveError>;
