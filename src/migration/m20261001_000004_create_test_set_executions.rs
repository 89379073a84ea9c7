//! Migration: Create test set executions table.
//!
//! A test set execution is one pooled run of a test set. It keeps no foreign
//! key to the test set so the run survives later edits or deletion of it.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE test_set_executions (
                    id VARCHAR(24) PRIMARY KEY,
                    test_set_id VARCHAR(24) NOT NULL,
                    project_id VARCHAR(24) NOT NULL,
                    cycle_id VARCHAR(24) NOT NULL,
                    status VARCHAR(20) NOT NULL DEFAULT 'PLANNED'
                        CHECK (status IN ('PLANNED', 'RUNNING', 'FINISHED', 'ABANDONED')),
                    actor VARCHAR(255),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    -- First successful claim
                    started_at TIMESTAMPTZ,
                    -- Pool exhausted
                    finished_at TIMESTAMPTZ
                );

                CREATE INDEX idx_test_set_executions_test_set_id ON test_set_executions(test_set_id);
                CREATE INDEX idx_test_set_executions_cycle_id ON test_set_executions(cycle_id);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS test_set_executions CASCADE;")
            .await?;

        Ok(())
    }
}
