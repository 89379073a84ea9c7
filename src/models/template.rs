//! Authoring-side templates read by the execution engine.
//!
//! Test cases, test sets and cycles are owned by the CRUD layer; the engine
//! only ever reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ObjectId;

/// One action/expectation pair of a test case template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub expected: String,
    /// TESTCASE artifacts attached by authors. Never copied into executions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<String>)]
    pub artifacts: Vec<ObjectId>,
}

/// Test case template.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(rename = "_id", alias = "id")]
    #[schema(value_type = String)]
    pub id: ObjectId,
    #[schema(value_type = String)]
    pub project_id: ObjectId,
    /// Parent node in the test case tree.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub parent_id: Option<ObjectId>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub test_steps: Vec<TestStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ordered collection of test cases run together.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestSet {
    #[serde(rename = "_id", alias = "id")]
    #[schema(value_type = String)]
    pub id: ObjectId,
    #[schema(value_type = String)]
    pub project_id: ObjectId,
    #[schema(value_type = String)]
    pub cycle_id: ObjectId,
    pub title: String,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub test_cases: Vec<ObjectId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Test cycle within a project.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cycle {
    #[serde(rename = "_id", alias = "id")]
    #[schema(value_type = String)]
    pub id: ObjectId,
    #[schema(value_type = String)]
    pub project_id: ObjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
