//! Artifact models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ObjectId;

/// What an artifact is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactType {
    Execution,
    Testcase,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execution => "EXECUTION",
            Self::Testcase => "TESTCASE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "EXECUTION" => Some(Self::Execution),
            "TESTCASE" => Some(Self::Testcase),
            _ => None,
        }
    }
}

/// Stored file attached to an execution or test case step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(rename = "_id", alias = "id")]
    #[schema(value_type = String)]
    pub id: ObjectId,
    pub title: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub execution_id: Option<ObjectId>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub test_case_id: Option<ObjectId>,
    #[serde(default)]
    pub step_index: Option<i32>,
    /// Storage key of the file.
    pub path: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub size_bytes: i64,
    #[serde(default)]
    pub user: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A file received for attachment.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Per-file attachment result.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachedFile {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub artifact_id: Option<ObjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttachedFile {
    pub fn stored(filename: String, artifact_id: ObjectId, path: String) -> Self {
        Self {
            filename,
            success: true,
            artifact_id: Some(artifact_id),
            path: Some(path),
            error: None,
        }
    }

    pub fn rejected(filename: String, error: String) -> Self {
        Self {
            filename,
            success: false,
            artifact_id: None,
            path: None,
            error: Some(error),
        }
    }
}

/// Response after attaching files to a step.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttachArtifactsResponse {
    /// True only when every file was stored.
    pub ok: bool,
    pub files: Vec<AttachedFile>,
}

impl AttachArtifactsResponse {
    pub fn new(files: Vec<AttachedFile>) -> Self {
        Self {
            ok: files.iter().all(|f| f.success),
            files,
        }
    }
}
