//! Submission keys

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifies a logical resource whose updates must be serialized
///
/// Usually the endpoint the partial update is sent to. Cheap to clone.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SubmissionKey(Arc<str>);

impl SubmissionKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubmissionKey({})", self.0)
    }
}

impl fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubmissionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SubmissionKey {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<SubmissionKey> for String {
    fn from(key: SubmissionKey) -> Self {
        key.0.to_string()
    }
}
