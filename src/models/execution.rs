//! Execution domain models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ObjectId, TestStep};

/// Execution (and execution step) status.
///
/// `Pending -> Working -> {Successful, Failed, Warning}`; any state returns to
/// `Pending` through a reset. Status is caller-asserted, no transition guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Working,
    Successful,
    Failed,
    Warning,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 5] = [
        Self::Pending,
        Self::Working,
        Self::Successful,
        Self::Failed,
        Self::Warning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Working => "WORKING",
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
            Self::Warning => "WARNING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "WORKING" => Some(Self::Working),
            "SUCCESSFUL" => Some(Self::Successful),
            "FAILED" => Some(Self::Failed),
            "WARNING" => Some(Self::Warning),
            _ => None,
        }
    }

    /// A finished verdict.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed | Self::Warning)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the execution is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionType {
    #[default]
    Manual,
    Automated,
}

impl ExecutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::Automated => "AUTOMATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MANUAL" => Some(Self::Manual),
            "AUTOMATED" => Some(Self::Automated),
            _ => None,
        }
    }
}

/// Step snapshot inside an execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub expected: String,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// EXECUTION artifacts attached while running this step.
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub artifacts: Vec<ObjectId>,
}

impl ExecutionStep {
    /// Copy a template step. Template artifacts are never inherited.
    pub fn from_template(step: &TestStep) -> Self {
        Self {
            action: step.action.clone(),
            payload: step.payload.clone(),
            expected: step.expected.clone(),
            status: ExecutionStatus::Pending,
            comment: None,
            artifacts: Vec::new(),
        }
    }

    /// Snapshot a whole template step sequence.
    pub fn snapshot(steps: &[TestStep]) -> Vec<Self> {
        steps.iter().map(Self::from_template).collect()
    }
}

/// A recorded run of one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(rename = "_id", alias = "id")]
    #[schema(value_type = String)]
    pub id: ObjectId,
    #[schema(value_type = String)]
    pub test_case_id: ObjectId,
    #[schema(value_type = String)]
    pub cycle_id: ObjectId,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub test_set_execution_id: Option<ObjectId>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub test_steps: Vec<ExecutionStep>,
    pub status: ExecutionStatus,
    pub execution_type: ExecutionType,
    /// Actor who last touched the execution.
    #[serde(default)]
    pub user: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Field-level write against a stored execution.
///
/// The identity and ownership fields (id, test case, cycle, pool, creation
/// time) have no counterpart here, so no write path can alter them.
#[derive(Debug, Clone)]
pub struct ExecutionPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<ExecutionStatus>,
    pub execution_type: Option<ExecutionType>,
    pub test_steps: Option<Vec<ExecutionStep>>,
    pub user: Option<String>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub finished_at: Option<Option<DateTime<Utc>>>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionPatch {
    /// A patch that only bumps `updated_at`.
    pub fn touch(now: DateTime<Utc>) -> Self {
        Self {
            title: None,
            description: None,
            status: None,
            execution_type: None,
            test_steps: None,
            user: None,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    /// Apply to an in-memory execution.
    pub fn apply_to(&self, execution: &mut Execution) {
        if let Some(ref title) = self.title {
            execution.title = title.clone();
        }
        if let Some(ref description) = self.description {
            execution.description = description.clone();
        }
        if let Some(status) = self.status {
            execution.status = status;
        }
        if let Some(execution_type) = self.execution_type {
            execution.execution_type = execution_type;
        }
        if let Some(ref steps) = self.test_steps {
            execution.test_steps = steps.clone();
        }
        if let Some(ref user) = self.user {
            execution.user = Some(user.clone());
        }
        if let Some(started_at) = self.started_at {
            execution.started_at = started_at;
        }
        if let Some(finished_at) = self.finished_at {
            execution.finished_at = finished_at;
        }
        execution.updated_at = self.updated_at;
    }
}

/// Request to create an execution.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateExecutionRequest {
    pub test_case_id: Option<String>,
    pub cycle_id: Option<String>,
    #[serde(default)]
    pub test_set_execution_id: Option<String>,
    /// Initial status, defaults to PENDING.
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
    #[serde(default)]
    pub execution_type: Option<ExecutionType>,
}

/// Allow-listed freeform edit of an execution.
///
/// Unknown keys (including `_id`, `cycleId`, `testCaseId`,
/// `testSetExecutionId`, `createdAt`, `testSteps`) are dropped on decode.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionUpdate {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub status: Option<ExecutionStatus>,
    pub execution_type: Option<ExecutionType>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub started_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub finished_at: Option<Option<DateTime<Utc>>>,
}

/// Distinguish an absent key (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ExecutionUpdate {
    pub fn into_patch(self, user: &str, now: DateTime<Utc>) -> ExecutionPatch {
        ExecutionPatch {
            title: self.title,
            description: self.description,
            status: self.status,
            execution_type: self.execution_type,
            test_steps: None,
            user: Some(user.to_string()),
            started_at: self.started_at,
            finished_at: self.finished_at,
            updated_at: now,
        }
    }
}

/// Request body for top-level and step status changes.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StatusRequest {
    pub status: ExecutionStatus,
}

/// Execution list filters.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionQuery {
    #[schema(value_type = Option<String>)]
    pub cycle_id: Option<ObjectId>,
    #[schema(value_type = Option<String>)]
    pub test_case_id: Option<ObjectId>,
    #[schema(value_type = Option<String>)]
    pub test_set_execution_id: Option<ObjectId>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ExecutionQuery {
    pub const DEFAULT_LIMIT: u64 = 100;
    pub const MAX_LIMIT: u64 = 500;

    pub fn clamped_limit(&self) -> u64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }

    /// In-memory equivalent of the store-side filter.
    pub fn matches(&self, execution: &Execution) -> bool {
        self.cycle_id.is_none_or(|id| execution.cycle_id == id)
            && self.test_case_id.is_none_or(|id| execution.test_case_id == id)
            && self
                .test_set_execution_id
                .is_none_or(|id| execution.test_set_execution_id == Some(id))
            && self.status.is_none_or(|s| execution.status == s)
    }
}
