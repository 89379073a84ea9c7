//! Database module providing connection management, migrations, and queries.

pub mod artifacts;
pub mod executions;
pub mod templates;
pub mod test_set_executions;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::migration::Migrator;
use crate::models::{
    Artifact, Cycle, Execution, ExecutionPatch, ExecutionQuery, ExecutionStatus, ExecutionStep,
    ObjectId, TestCase, TestSet, TestSetExecution,
};
use crate::store::{EntityStore, PoolDispense};

/// PostgreSQL connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect to PostgreSQL.
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let mut options = ConnectOptions::new(database_url.to_owned());
        options.max_connections(max_connections).sqlx_logging(false);

        let conn = Database::connect(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(DbPool { conn })
    }

    /// Apply pending schema migrations.
    pub async fn run_migrations(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None)
            .await
            .map_err(|e| AppError::Database(format!("Failed to run migrations: {}", e)))?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Get access to the connection for executing queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }
}

/// Parse an id read back from a row.
pub(crate) fn stored_id(value: &str, what: &str) -> AppResult<ObjectId> {
    ObjectId::parse(value)
        .map_err(|_| AppError::Database(format!("Stored {} id '{}' is malformed", what, value)))
}

/// Parse an optional id read back from a row.
pub(crate) fn stored_opt_id(value: Option<&str>, what: &str) -> AppResult<Option<ObjectId>> {
    value.map(|v| stored_id(v, what)).transpose()
}

#[async_trait]
impl EntityStore for DbPool {
    async fn ping(&self) -> AppResult<()> {
        let stmt = sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Postgres,
            "SELECT 1".to_owned(),
        );
        self.connection()
            .query_one_raw(stmt)
            .await
            .map_err(|e| AppError::Database(format!("Ping failed: {}", e)))?;
        Ok(())
    }

    async fn find_test_case(&self, id: ObjectId) -> AppResult<Option<TestCase>> {
        self.get_test_case(id).await
    }

    async fn find_test_set(&self, id: ObjectId) -> AppResult<Option<TestSet>> {
        self.get_test_set(id).await
    }

    async fn find_cycle(&self, id: ObjectId) -> AppResult<Option<Cycle>> {
        self.get_cycle(id).await
    }

    async fn find_execution(&self, id: ObjectId) -> AppResult<Option<Execution>> {
        self.get_execution(id).await
    }

    async fn find_executions(&self, query: &ExecutionQuery) -> AppResult<Vec<Execution>> {
        self.query_executions(query).await
    }

    async fn insert_execution(&self, execution: &Execution) -> AppResult<()> {
        DbPool::insert_execution(self, execution).await
    }

    async fn update_execution(
        &self,
        id: ObjectId,
        patch: &ExecutionPatch,
        expected_status: Option<ExecutionStatus>,
    ) -> AppResult<u64> {
        self.patch_execution(id, patch, expected_status).await
    }

    async fn set_execution_step(
        &self,
        id: ObjectId,
        index: usize,
        step: &ExecutionStep,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.replace_execution_step(id, index, step, now).await
    }

    async fn set_execution_step_status(
        &self,
        id: ObjectId,
        index: usize,
        status: ExecutionStatus,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.update_execution_step_status(id, index, status, now)
            .await
    }

    async fn push_execution_step_artifact(
        &self,
        id: ObjectId,
        index: usize,
        artifact_id: ObjectId,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.append_execution_step_artifact(id, index, artifact_id, now)
            .await
    }

    async fn delete_execution(&self, id: ObjectId) -> AppResult<u64> {
        DbPool::delete_execution(self, id).await
    }

    async fn insert_test_set_execution(
        &self,
        run: &TestSetExecution,
        executions: &[Execution],
    ) -> AppResult<()> {
        self.insert_run_with_executions(run, executions).await
    }

    async fn find_test_set_execution(&self, id: ObjectId) -> AppResult<Option<TestSetExecution>> {
        self.get_test_set_execution(id).await
    }

    async fn claim_next_execution(
        &self,
        run_id: ObjectId,
        now: DateTime<Utc>,
    ) -> AppResult<PoolDispense> {
        self.dispense_next(run_id, now).await
    }

    async fn has_pending_execution(&self, run_id: ObjectId) -> AppResult<bool> {
        self.any_pending(run_id).await
    }

    async fn execution_status_counts(
        &self,
        run_id: ObjectId,
    ) -> AppResult<Vec<(ExecutionStatus, u64)>> {
        self.count_executions_by_status(run_id).await
    }

    async fn abandon_test_set_execution(
        &self,
        run_id: ObjectId,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.mark_run_abandoned(run_id, now).await
    }

    async fn release_stale_claims(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.revert_stale_claims(cutoff, now).await
    }

    async fn insert_artifact(&self, artifact: &Artifact) -> AppResult<()> {
        DbPool::insert_artifact(self, artifact).await
    }

    async fn find_artifact(&self, id: ObjectId) -> AppResult<Option<Artifact>> {
        self.get_artifact(id).await
    }

    async fn delete_artifact(&self, id: ObjectId) -> AppResult<u64> {
        DbPool::delete_artifact(self, id).await
    }
}
