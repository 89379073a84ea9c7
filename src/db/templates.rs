//! Read-only queries for templates owned by the CRUD layer.

use sea_orm::EntityTrait;

use crate::entity::cycle::{self, Entity as CycleEntity};
use crate::entity::test_case::{self, Entity as TestCaseEntity};
use crate::entity::test_set::{self, Entity as TestSetEntity};
use crate::error::{AppError, AppResult};
use crate::models::{Cycle, ObjectId, TestCase, TestSet, TestStep};

use super::{DbPool, stored_id, stored_opt_id};

fn to_test_case(model: test_case::Model) -> AppResult<TestCase> {
    let test_steps: Vec<TestStep> = serde_json::from_value(model.test_steps).map_err(|e| {
        AppError::Database(format!("Test case {} has malformed steps: {}", model.id, e))
    })?;

    Ok(TestCase {
        id: stored_id(&model.id, "test case")?,
        project_id: stored_id(&model.project_id, "project")?,
        parent_id: stored_opt_id(model.parent_id.as_deref(), "test case parent")?,
        title: model.title,
        description: model.description,
        test_steps,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn to_test_set(model: test_set::Model) -> AppResult<TestSet> {
    let ids: Vec<String> = serde_json::from_value(model.test_cases).map_err(|e| {
        AppError::Database(format!(
            "Test set {} has malformed test case list: {}",
            model.id, e
        ))
    })?;
    let test_cases = ids
        .iter()
        .map(|id| stored_id(id, "test case"))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(TestSet {
        id: stored_id(&model.id, "test set")?,
        project_id: stored_id(&model.project_id, "project")?,
        cycle_id: stored_id(&model.cycle_id, "cycle")?,
        title: model.title,
        test_cases,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn to_cycle(model: cycle::Model) -> AppResult<Cycle> {
    Ok(Cycle {
        id: stored_id(&model.id, "cycle")?,
        project_id: stored_id(&model.project_id, "project")?,
        name: model.name,
        created_at: model.created_at,
    })
}

impl DbPool {
    /// Get a test case template by ID.
    pub async fn get_test_case(&self, id: ObjectId) -> AppResult<Option<TestCase>> {
        let result = TestCaseEntity::find_by_id(id.to_string())
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get test case: {}", e)))?;

        result.map(to_test_case).transpose()
    }

    /// Get a test set by ID.
    pub async fn get_test_set(&self, id: ObjectId) -> AppResult<Option<TestSet>> {
        let result = TestSetEntity::find_by_id(id.to_string())
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get test set: {}", e)))?;

        result.map(to_test_set).transpose()
    }

    /// Get a cycle by ID.
    pub async fn get_cycle(&self, id: ObjectId) -> AppResult<Option<Cycle>> {
        let result = CycleEntity::find_by_id(id.to_string())
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get cycle: {}", e)))?;

        result.map(to_cycle).transpose()
    }
}
