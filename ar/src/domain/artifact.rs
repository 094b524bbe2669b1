//! Artifacts produced by completed runs and uploaded input files

use serde::{Deserialize, Serialize};

/// A named output object referenced by a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub name: String,

    /// MIME type or short kind label ("markdown", "json", ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Size in bytes
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Inline content for small artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Payload of a `complete` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub summary: String,
    pub artifacts: Vec<Artifact>,
}

/// Response to a file upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
}
