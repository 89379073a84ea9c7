//! Migration: Create test case templates table.

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
                CREATE TABLE test_cases (
                    id VARCHAR(24) PRIMARY KEY,
                    project_id VARCHAR(24) NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    -- Tree structure: folders and cases share the table
                    parent_id VARCHAR(24) REFERENCES test_cases(id) ON DELETE CASCADE,
                    title VARCHAR(500) NOT NULL,
                    description TEXT,
                    -- Ordered steps: [{action, payload, expected, artifacts}]
                    test_steps JSONB NOT NULL DEFAULT '[]'::jsonb,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_test_cases_project_id ON test_cases(project_id);
                CREATE INDEX idx_test_cases_parent_id ON test_cases(parent_id);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS test_cases CASCADE;")
            .await?;

        Ok(())
    }
}
