//! Migration: Create test sets table.

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
                CREATE TABLE test_sets (
                    id VARCHAR(24) PRIMARY KEY,
                    project_id VARCHAR(24) NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    cycle_id VARCHAR(24) NOT NULL REFERENCES cycles(id) ON DELETE CASCADE,
                    title VARCHAR(500) NOT NULL,
                    -- Ordered array of test case ids
                    test_cases JSONB NOT NULL DEFAULT '[]'::jsonb,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_test_sets_cycle_id ON test_sets(cycle_id);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS test_sets CASCADE;")
            .await?;

        Ok(())
    }
}
