//! Database queries for executions.
//!
//! Step writes go through `jsonb_set` on a single index so concurrent edits
//! of different steps do not overwrite each other.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
};

use crate::entity::execution::{self, ActiveModel, Entity as ExecutionEntity};
use crate::error::{AppError, AppResult};
use crate::models::{
    Execution, ExecutionPatch, ExecutionQuery, ExecutionStatus, ExecutionStep, ExecutionType,
    ObjectId,
};

use super::{DbPool, stored_id, stored_opt_id};

/// Atomically hand out the oldest pending execution of a pool.
///
/// `SKIP LOCKED` lets a concurrent claimer move on to the next row instead of
/// waiting; the outer `status = 'PENDING'` re-check makes a lost race match
/// nothing.
const CLAIM_NEXT_PENDING_SQL: &str = r#"
    UPDATE executions
    SET status = 'WORKING', started_at = $2, updated_at = $2
    WHERE id = (
        SELECT id FROM executions
        WHERE test_set_execution_id = $1 AND status = 'PENDING'
        ORDER BY id
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    AND status = 'PENDING'
    RETURNING *
"#;

const COUNT_BY_STATUS_SQL: &str = r#"
    SELECT status, COUNT(*) AS count
    FROM executions
    WHERE test_set_execution_id = $1
    GROUP BY status
"#;

pub(crate) fn to_execution(model: execution::Model) -> AppResult<Execution> {
    let test_steps: Vec<ExecutionStep> =
        serde_json::from_value(model.test_steps).map_err(|e| {
            AppError::Database(format!("Execution {} has malformed steps: {}", model.id, e))
        })?;
    let status = ExecutionStatus::parse(&model.status).ok_or_else(|| {
        AppError::Database(format!(
            "Execution {} has unknown status '{}'",
            model.id, model.status
        ))
    })?;
    let execution_type = ExecutionType::parse(&model.execution_type).unwrap_or_default();

    Ok(Execution {
        id: stored_id(&model.id, "execution")?,
        test_case_id: stored_id(&model.test_case_id, "test case")?,
        cycle_id: stored_id(&model.cycle_id, "cycle")?,
        test_set_execution_id: stored_opt_id(
            model.test_set_execution_id.as_deref(),
            "test set execution",
        )?,
        title: model.title,
        description: model.description,
        test_steps,
        status,
        execution_type,
        user: model.actor,
        created_at: model.created_at,
        updated_at: model.updated_at,
        started_at: model.started_at,
        finished_at: model.finished_at,
    })
}

fn steps_json(steps: &[ExecutionStep]) -> AppResult<serde_json::Value> {
    serde_json::to_value(steps)
        .map_err(|e| AppError::Database(format!("Failed to encode steps: {}", e)))
}

pub(crate) fn to_active_model(execution: &Execution) -> AppResult<ActiveModel> {
    Ok(ActiveModel {
        id: Set(execution.id.to_string()),
        test_case_id: Set(execution.test_case_id.to_string()),
        cycle_id: Set(execution.cycle_id.to_string()),
        test_set_execution_id: Set(execution.test_set_execution_id.map(|id| id.to_string())),
        title: Set(execution.title.clone()),
        description: Set(execution.description.clone()),
        test_steps: Set(steps_json(&execution.test_steps)?),
        status: Set(execution.status.as_str().to_string()),
        execution_type: Set(execution.execution_type.as_str().to_string()),
        actor: Set(execution.user.clone()),
        created_at: Set(execution.created_at),
        updated_at: Set(execution.updated_at),
        started_at: Set(execution.started_at),
        finished_at: Set(execution.finished_at),
    })
}

/// Filter matching only when `index` addresses an existing step.
fn step_in_range(index: usize) -> SimpleExpr {
    Expr::cust(format!("jsonb_array_length(test_steps) > {}", index))
}

/// Claim the next pending execution of a pool on `conn`.
pub(crate) async fn claim_next_pending<C: ConnectionTrait>(
    conn: &C,
    run_id: ObjectId,
    now: DateTime<Utc>,
) -> AppResult<Option<Execution>> {
    let claimed = execution::Model::find_by_statement(Statement::from_sql_and_values(
        DatabaseBackend::Postgres,
        CLAIM_NEXT_PENDING_SQL,
        [run_id.to_string().into(), now.into()],
    ))
    .one(conn)
    .await
    .map_err(|e| AppError::Database(format!("Failed to claim execution: {}", e)))?;

    claimed.map(to_execution).transpose()
}

impl DbPool {
    /// Get an execution by ID.
    pub async fn get_execution(&self, id: ObjectId) -> AppResult<Option<Execution>> {
        let result = ExecutionEntity::find_by_id(id.to_string())
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get execution: {}", e)))?;

        result.map(to_execution).transpose()
    }

    /// Query executions with filtering and pagination.
    pub async fn query_executions(&self, query: &ExecutionQuery) -> AppResult<Vec<Execution>> {
        let mut select = ExecutionEntity::find();

        if let Some(cycle_id) = query.cycle_id {
            select = select.filter(execution::Column::CycleId.eq(cycle_id.to_string()));
        }

        if let Some(test_case_id) = query.test_case_id {
            select = select.filter(execution::Column::TestCaseId.eq(test_case_id.to_string()));
        }

        if let Some(run_id) = query.test_set_execution_id {
            select = select.filter(execution::Column::TestSetExecutionId.eq(run_id.to_string()));
        }

        if let Some(status) = query.status {
            select = select.filter(execution::Column::Status.eq(status.as_str()));
        }

        let models = select
            .order_by_asc(execution::Column::Id)
            .offset(query.offset())
            .limit(query.clamped_limit())
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to query executions: {}", e)))?;

        models.into_iter().map(to_execution).collect()
    }

    /// Insert a new execution.
    pub async fn insert_execution(&self, execution: &Execution) -> AppResult<()> {
        to_active_model(execution)?
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert execution: {}", e)))?;

        Ok(())
    }

    /// Apply a patch, optionally conditioned on the current status.
    pub async fn patch_execution(
        &self,
        id: ObjectId,
        patch: &ExecutionPatch,
        expected_status: Option<ExecutionStatus>,
    ) -> AppResult<u64> {
        let mut update = ExecutionEntity::update_many()
            .col_expr(execution::Column::UpdatedAt, Expr::value(patch.updated_at));

        if let Some(ref title) = patch.title {
            update = update.col_expr(execution::Column::Title, Expr::value(title.clone()));
        }
        if let Some(ref description) = patch.description {
            update = update.col_expr(
                execution::Column::Description,
                Expr::value(description.clone()),
            );
        }
        if let Some(status) = patch.status {
            update = update.col_expr(execution::Column::Status, Expr::value(status.as_str()));
        }
        if let Some(execution_type) = patch.execution_type {
            update = update.col_expr(
                execution::Column::ExecutionType,
                Expr::value(execution_type.as_str()),
            );
        }
        if let Some(ref steps) = patch.test_steps {
            update = update.col_expr(execution::Column::TestSteps, Expr::value(steps_json(steps)?));
        }
        if let Some(ref user) = patch.user {
            update = update.col_expr(execution::Column::Actor, Expr::value(Some(user.clone())));
        }
        if let Some(started_at) = patch.started_at {
            update = update.col_expr(execution::Column::StartedAt, Expr::value(started_at));
        }
        if let Some(finished_at) = patch.finished_at {
            update = update.col_expr(execution::Column::FinishedAt, Expr::value(finished_at));
        }

        let mut update = update.filter(execution::Column::Id.eq(id.to_string()));
        if let Some(expected) = expected_status {
            update = update.filter(execution::Column::Status.eq(expected.as_str()));
        }

        let result = update
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update execution: {}", e)))?;

        Ok(result.rows_affected)
    }

    /// Replace the whole step at `index`.
    pub async fn replace_execution_step(
        &self,
        id: ObjectId,
        index: usize,
        step: &ExecutionStep,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let value = serde_json::to_value(step)
            .map_err(|e| AppError::Database(format!("Failed to encode step: {}", e)))?;

        let result = ExecutionEntity::update_many()
            .col_expr(
                execution::Column::TestSteps,
                Expr::cust_with_values(
                    format!("jsonb_set(test_steps, '{{{}}}', $1::jsonb)", index),
                    [value],
                ),
            )
            .col_expr(execution::Column::UpdatedAt, Expr::value(now))
            .filter(execution::Column::Id.eq(id.to_string()))
            .filter(step_in_range(index))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update execution step: {}", e)))?;

        Ok(result.rows_affected)
    }

    /// Replace only the status of the step at `index`.
    pub async fn update_execution_step_status(
        &self,
        id: ObjectId,
        index: usize,
        status: ExecutionStatus,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = ExecutionEntity::update_many()
            .col_expr(
                execution::Column::TestSteps,
                Expr::cust_with_values(
                    format!(
                        "jsonb_set(test_steps, '{{{},status}}', to_jsonb($1::text))",
                        index
                    ),
                    [status.as_str()],
                ),
            )
            .col_expr(execution::Column::UpdatedAt, Expr::value(now))
            .filter(execution::Column::Id.eq(id.to_string()))
            .filter(step_in_range(index))
            .exec(self.connection())
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to update execution step status: {}", e))
            })?;

        Ok(result.rows_affected)
    }

    /// Append an artifact id to the step at `index`.
    pub async fn append_execution_step_artifact(
        &self,
        id: ObjectId,
        index: usize,
        artifact_id: ObjectId,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = ExecutionEntity::update_many()
            .col_expr(
                execution::Column::TestSteps,
                Expr::cust_with_values(
                    format!(
                        "jsonb_set(test_steps, '{{{i},artifacts}}', \
                         COALESCE(test_steps->{i}->'artifacts', '[]'::jsonb) || to_jsonb($1::text))",
                        i = index
                    ),
                    [artifact_id.to_string()],
                ),
            )
            .col_expr(execution::Column::UpdatedAt, Expr::value(now))
            .filter(execution::Column::Id.eq(id.to_string()))
            .filter(step_in_range(index))
            .exec(self.connection())
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to attach artifact to step: {}", e))
            })?;

        Ok(result.rows_affected)
    }

    /// Delete an execution.
    pub async fn delete_execution(&self, id: ObjectId) -> AppResult<u64> {
        let result = ExecutionEntity::delete_by_id(id.to_string())
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete execution: {}", e)))?;

        Ok(result.rows_affected)
    }

    /// Whether a pool still has pending executions.
    pub async fn any_pending(&self, run_id: ObjectId) -> AppResult<bool> {
        let result = ExecutionEntity::find()
            .select_only()
            .column(execution::Column::Id)
            .filter(execution::Column::TestSetExecutionId.eq(run_id.to_string()))
            .filter(execution::Column::Status.eq(ExecutionStatus::Pending.as_str()))
            .into_tuple::<String>()
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to check pending executions: {}", e)))?;

        Ok(result.is_some())
    }

    /// Count a pool's executions per status.
    pub async fn count_executions_by_status(
        &self,
        run_id: ObjectId,
    ) -> AppResult<Vec<(ExecutionStatus, u64)>> {
        #[derive(Debug, FromQueryResult)]
        struct StatusCount {
            status: String,
            count: i64,
        }

        let rows = StatusCount::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            COUNT_BY_STATUS_SQL,
            [run_id.to_string().into()],
        ))
        .all(self.connection())
        .await
        .map_err(|e| AppError::Database(format!("Failed to count executions: {}", e)))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                ExecutionStatus::parse(&row.status).map(|status| (status, row.count.max(0) as u64))
            })
            .collect())
    }

    /// Revert stale pool claims to PENDING.
    pub async fn revert_stale_claims(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = ExecutionEntity::update_many()
            .col_expr(
                execution::Column::Status,
                Expr::value(ExecutionStatus::Pending.as_str()),
            )
            .col_expr(
                execution::Column::StartedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(execution::Column::UpdatedAt, Expr::value(now))
            .filter(execution::Column::Status.eq(ExecutionStatus::Working.as_str()))
            .filter(execution::Column::TestSetExecutionId.is_not_null())
            .filter(execution::Column::UpdatedAt.lt(cutoff))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to release stale claims: {}", e)))?;

        Ok(result.rows_affected)
    }
}
