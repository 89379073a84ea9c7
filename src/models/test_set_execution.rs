//! Test-set execution (pooled run) models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Execution, ExecutionStatus, ObjectId};

/// Lifecycle of a pooled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestSetExecutionStatus {
    /// Spawned, nothing claimed yet.
    #[default]
    Planned,
    /// At least one execution has been claimed.
    Running,
    /// The pool ran out of pending executions.
    Finished,
    /// Stopped on purpose; claims return end-of-pool.
    Abandoned,
}

impl TestSetExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "PLANNED",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Abandoned => "ABANDONED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLANNED" => Some(Self::Planned),
            "RUNNING" => Some(Self::Running),
            "FINISHED" => Some(Self::Finished),
            "ABANDONED" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

impl std::fmt::Display for TestSetExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One batch run of a test set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestSetExecution {
    #[serde(rename = "_id", alias = "id")]
    #[schema(value_type = String)]
    pub id: ObjectId,
    #[schema(value_type = String)]
    pub test_set_id: ObjectId,
    #[schema(value_type = String)]
    pub project_id: ObjectId,
    #[schema(value_type = String)]
    pub cycle_id: ObjectId,
    pub status: TestSetExecutionStatus,
    #[serde(default)]
    pub user: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set by the first successful claim.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the pool is exhausted.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Request to spawn a run from a test set.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpawnTestSetExecutionRequest {
    pub test_set_id: Option<String>,
    pub project_id: Option<String>,
    pub cycle_id: Option<String>,
}

/// Per-status execution counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolProgress {
    pub total: u64,
    pub pending: u64,
    pub working: u64,
    pub successful: u64,
    pub failed: u64,
    pub warning: u64,
}

impl PoolProgress {
    pub fn from_counts(counts: &[(ExecutionStatus, u64)]) -> Self {
        let mut progress = Self::default();
        for &(status, count) in counts {
            progress.total += count;
            match status {
                ExecutionStatus::Pending => progress.pending += count,
                ExecutionStatus::Working => progress.working += count,
                ExecutionStatus::Successful => progress.successful += count,
                ExecutionStatus::Failed => progress.failed += count,
                ExecutionStatus::Warning => progress.warning += count,
            }
        }
        progress
    }
}

/// Run details with progress counts.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestSetExecutionDetail {
    #[serde(flatten)]
    pub run: TestSetExecution,
    pub progress: PoolProgress,
}

/// Outcome of a claim.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The caller now owns this execution (status WORKING).
    Claimed(Box<Execution>),
    /// Nothing left to dispense; workers should stop polling.
    EndOfPool,
}

/// Claim response body.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
}

impl From<Claim> for ClaimResponse {
    fn from(claim: Claim) -> Self {
        match claim {
            Claim::Claimed(execution) => Self {
                done: false,
                execution: Some(*execution),
            },
            Claim::EndOfPool => Self {
                done: true,
                execution: None,
            },
        }
    }
}

/// Pending-check response body.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HasPendingResponse {
    pub has_pending: bool,
}
