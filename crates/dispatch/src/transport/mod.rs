//! Transport seam and wire types
//!
//! One partial-update request per dispatch. The body carries the merge
//! patch and the version token it was built against; the response reports
//! whether the server applied it.

pub mod memory;

use crate::error::TransportError;
use async_trait::async_trait;
use autosync_core::{MergePatch, SubmissionKey, VersionToken};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outbound partial update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchRequest {
    /// Target resource; addresses the request, not part of the body
    #[serde(skip)]
    pub key: SubmissionKey,
    pub patch: MergePatch,
    pub version: Option<VersionToken>,
}

/// Server verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Conflict,
    Error,
}

/// Inbound response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchResponse {
    pub status: ResponseStatus,
    /// Server's current version after handling the request
    pub version: VersionToken,
    /// Field-level messages keyed by dotted path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PatchResponse {
    pub fn ok(version: impl Into<VersionToken>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            version: version.into(),
            errors: BTreeMap::new(),
            message: None,
        }
    }

    pub fn conflict(version: impl Into<VersionToken>) -> Self {
        Self {
            status: ResponseStatus::Conflict,
            ..Self::ok(version)
        }
    }

    pub fn error(version: impl Into<VersionToken>, errors: BTreeMap<String, String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            errors,
            ..Self::ok(version)
        }
    }
}

/// Sends partial updates to the resource endpoint
///
/// Implementations must not retry on their own; a failed request is
/// reported as-is and the next edit or manual save triggers the next send.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PatchRequest) -> Result<PatchResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let request = PatchRequest {
            key: SubmissionKey::from("/api/personas/3"),
            patch: json!({ "name": "Ada" }),
            version: Some(VersionToken::from(5u64)),
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "patch": { "name": "Ada" }, "version": "5" })
        );
    }

    #[test]
    fn test_response_parsing() {
        let response: PatchResponse = serde_json::from_value(json!({
            "status": "error",
            "version": "9",
            "errors": { "profile.name": "required" }
        }))
        .unwrap();

        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.version, VersionToken::from(9u64));
        assert_eq!(response.errors.get("profile.name").map(String::as_str), Some("required"));

        let ok: PatchResponse =
            serde_json::from_value(json!({ "status": "ok", "version": "10" })).unwrap();
        assert_eq!(ok, PatchResponse::ok(10u64));
    }
}
