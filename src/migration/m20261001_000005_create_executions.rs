//! Migration: Create executions table.
//!
//! Steps are a JSONB snapshot of the test case at creation (or reset) time.
//! No foreign key to test_cases: executions outlive their template.

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
                CREATE TABLE executions (
                    id VARCHAR(24) PRIMARY KEY,
                    test_case_id VARCHAR(24) NOT NULL,
                    cycle_id VARCHAR(24) NOT NULL,
                    test_set_execution_id VARCHAR(24)
                        REFERENCES test_set_executions(id) ON DELETE CASCADE,
                    title VARCHAR(500) NOT NULL,
                    description TEXT,
                    -- Snapshot: [{action, payload, expected, status, comment, artifacts}]
                    test_steps JSONB NOT NULL DEFAULT '[]'::jsonb,
                    status VARCHAR(20) NOT NULL DEFAULT 'PENDING'
                        CHECK (status IN ('PENDING', 'WORKING', 'SUCCESSFUL', 'FAILED', 'WARNING')),
                    execution_type VARCHAR(20) NOT NULL DEFAULT 'MANUAL'
                        CHECK (execution_type IN ('MANUAL', 'AUTOMATED')),
                    actor VARCHAR(255),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    started_at TIMESTAMPTZ,
                    finished_at TIMESTAMPTZ
                );

                CREATE INDEX idx_executions_cycle_id ON executions(cycle_id);
                CREATE INDEX idx_executions_test_case_id ON executions(test_case_id);
                CREATE INDEX idx_executions_test_set_execution_id ON executions(test_set_execution_id);

                -- Claim path: next pending execution of a pool
                CREATE INDEX idx_executions_pool_pending ON executions(test_set_execution_id, id)
                    WHERE status = 'PENDING';

                -- Stale claim sweep
                CREATE INDEX idx_executions_pool_working ON executions(updated_at)
                    WHERE status = 'WORKING' AND test_set_execution_id IS NOT NULL;
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS executions CASCADE;")
            .await?;

        Ok(())
    }
}
