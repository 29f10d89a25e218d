//! Core data model for autosync
//!
//! This crate provides:
//! - Submission keys and optimistic version tokens
//! - Dotted/indexed field paths
//! - Per-path field schema with typed coercion
//! - The change accumulator that folds field edits into one merge patch
//! - The version guard that tracks the last confirmed server state

pub mod accumulator;
pub mod error;
pub mod key;
pub mod path;
pub mod schema;
pub mod version;

// Re-exports
pub use accumulator::{CapturedPatch, ChangeAccumulator};
pub use error::{PathError, ValidationError};
pub use key::SubmissionKey;
pub use path::{FieldPath, Segment};
pub use schema::{FieldType, Schema};
pub use version::{VersionGuard, VersionToken};

/// A nested partial-update document
pub type MergePatch = serde_json::Value;
