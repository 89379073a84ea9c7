//! Database queries for test-set executions (pooled runs).

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};

use crate::entity::execution::Entity as ExecutionEntity;
use crate::entity::test_set_execution::{self, ActiveModel, Entity as TestSetExecutionEntity};
use crate::error::{AppError, AppResult};
use crate::models::{Execution, ObjectId, TestSetExecution, TestSetExecutionStatus};
use crate::store::PoolDispense;

use super::executions::{claim_next_pending, to_active_model};
use super::{DbPool, stored_id};

fn to_test_set_execution(model: test_set_execution::Model) -> AppResult<TestSetExecution> {
    let status = TestSetExecutionStatus::parse(&model.status).ok_or_else(|| {
        AppError::Database(format!(
            "Test set execution {} has unknown status '{}'",
            model.id, model.status
        ))
    })?;

    Ok(TestSetExecution {
        id: stored_id(&model.id, "test set execution")?,
        test_set_id: stored_id(&model.test_set_id, "test set")?,
        project_id: stored_id(&model.project_id, "project")?,
        cycle_id: stored_id(&model.cycle_id, "cycle")?,
        status,
        user: model.actor,
        created_at: model.created_at,
        updated_at: model.updated_at,
        started_at: model.started_at,
        finished_at: model.finished_at,
    })
}

fn not_abandoned() -> SimpleExpr {
    test_set_execution::Column::Status.ne(TestSetExecutionStatus::Abandoned.as_str())
}

/// Move a run to RUNNING unless it was abandoned.
async fn mark_run_running<C: ConnectionTrait>(
    conn: &C,
    id: ObjectId,
    now: DateTime<Utc>,
) -> AppResult<u64> {
    let result = TestSetExecutionEntity::update_many()
        .col_expr(
            test_set_execution::Column::Status,
            Expr::value(TestSetExecutionStatus::Running.as_str()),
        )
        .col_expr(
            test_set_execution::Column::StartedAt,
            Expr::cust_with_values("COALESCE(started_at, $1)", [now]),
        )
        .col_expr(
            test_set_execution::Column::FinishedAt,
            Expr::value(Option::<DateTime<Utc>>::None),
        )
        .col_expr(test_set_execution::Column::UpdatedAt, Expr::value(now))
        .filter(test_set_execution::Column::Id.eq(id.to_string()))
        .filter(not_abandoned())
        .exec(conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to start test set execution: {}", e)))?;

    Ok(result.rows_affected)
}

/// Move a run to FINISHED unless it was abandoned.
async fn mark_run_finished<C: ConnectionTrait>(
    conn: &C,
    id: ObjectId,
    now: DateTime<Utc>,
) -> AppResult<u64> {
    let result = TestSetExecutionEntity::update_many()
        .col_expr(
            test_set_execution::Column::Status,
            Expr::value(TestSetExecutionStatus::Finished.as_str()),
        )
        .col_expr(
            test_set_execution::Column::FinishedAt,
            Expr::cust_with_values("COALESCE(finished_at, $1)", [now]),
        )
        .col_expr(test_set_execution::Column::UpdatedAt, Expr::value(now))
        .filter(test_set_execution::Column::Id.eq(id.to_string()))
        .filter(not_abandoned())
        .exec(conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to finish test set execution: {}", e)))?;

    Ok(result.rows_affected)
}

impl DbPool {
    /// Insert a run and all of its executions in one transaction.
    pub async fn insert_run_with_executions(
        &self,
        run: &TestSetExecution,
        executions: &[Execution],
    ) -> AppResult<()> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let model = ActiveModel {
            id: Set(run.id.to_string()),
            test_set_id: Set(run.test_set_id.to_string()),
            project_id: Set(run.project_id.to_string()),
            cycle_id: Set(run.cycle_id.to_string()),
            status: Set(run.status.as_str().to_string()),
            actor: Set(run.user.clone()),
            created_at: Set(run.created_at),
            updated_at: Set(run.updated_at),
            started_at: Set(run.started_at),
            finished_at: Set(run.finished_at),
        };
        model
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert test set execution: {}", e)))?;

        if !executions.is_empty() {
            let models = executions
                .iter()
                .map(to_active_model)
                .collect::<AppResult<Vec<_>>>()?;
            ExecutionEntity::insert_many(models)
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(format!("Failed to insert executions: {}", e)))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(())
    }

    /// Get a run by ID.
    pub async fn get_test_set_execution(
        &self,
        id: ObjectId,
    ) -> AppResult<Option<TestSetExecution>> {
        let result = TestSetExecutionEntity::find_by_id(id.to_string())
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get test set execution: {}", e)))?;

        result.map(to_test_set_execution).transpose()
    }

    /// Claim the next pending execution and move the run accordingly.
    ///
    /// The run row is locked for the duration of the transaction, so claims,
    /// the FINISHED transition and abandonment of one run are serialized.
    pub async fn dispense_next(
        &self,
        run_id: ObjectId,
        now: DateTime<Utc>,
    ) -> AppResult<PoolDispense> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let run = TestSetExecutionEntity::find_by_id(run_id.to_string())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to lock test set execution: {}", e)))?;
        let Some(run) = run else {
            return Ok(PoolDispense::UnknownRun);
        };
        let run = to_test_set_execution(run)?;

        let outcome = match run.status {
            TestSetExecutionStatus::Abandoned => PoolDispense::Abandoned,
            _ => match claim_next_pending(&txn, run_id, now).await? {
                Some(execution) => {
                    mark_run_running(&txn, run_id, now).await?;
                    PoolDispense::Claimed(execution)
                }
                None => {
                    mark_run_finished(&txn, run_id, now).await?;
                    PoolDispense::Exhausted {
                        newly_finished: run.status != TestSetExecutionStatus::Finished,
                    }
                }
            },
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(outcome)
    }

    /// Mark a run ABANDONED.
    pub async fn mark_run_abandoned(&self, id: ObjectId, now: DateTime<Utc>) -> AppResult<u64> {
        let result = TestSetExecutionEntity::update_many()
            .col_expr(
                test_set_execution::Column::Status,
                Expr::value(TestSetExecutionStatus::Abandoned.as_str()),
            )
            .col_expr(
                test_set_execution::Column::FinishedAt,
                Expr::cust_with_values("COALESCE(finished_at, $1)", [now]),
            )
            .col_expr(test_set_execution::Column::UpdatedAt, Expr::value(now))
            .filter(test_set_execution::Column::Id.eq(id.to_string()))
            .exec(self.connection())
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to abandon test set execution: {}", e))
            })?;

        Ok(result.rows_affected)
    }
}
