//! Error types for path parsing and value coercion

use thiserror::Error;

/// A field path could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("field path is empty")]
    Empty,

    #[error("empty segment at byte {offset} in '{path}'")]
    EmptySegment { path: String, offset: usize },

    #[error("unterminated index in '{path}'")]
    UnterminatedIndex { path: String },

    #[error("invalid index '{index}' in '{path}'")]
    InvalidIndex { path: String, index: String },

    #[error("index {index} in '{path}' exceeds the maximum of {max}")]
    IndexTooLarge {
        path: String,
        index: String,
        max: usize,
    },

    #[error("unexpected character '{found}' at byte {offset} in '{path}'")]
    UnexpectedChar {
        path: String,
        offset: usize,
        found: char,
    },
}

/// A field value was rejected before it reached the change queue
///
/// Surfaced inline next to the offending field; never sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("field '{path}' is not declared in the schema")]
    UnknownField { path: String },

    #[error("field '{path}' expects {expected}, got {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("field '{path}' does not allow '{value}' (expected one of: {allowed})")]
    NotAllowed {
        path: String,
        value: String,
        allowed: String,
    },
}

impl ValidationError {
    /// Dotted path of the field the error belongs to, if known
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Path(_) => None,
            Self::UnknownField { path }
            | Self::TypeMismatch { path, .. }
            | Self::NotAllowed { path, .. } => Some(path),
        }
    }
}
