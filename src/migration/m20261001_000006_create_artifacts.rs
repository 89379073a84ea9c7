//! Migration: Create artifacts table.

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
                CREATE TABLE artifacts (
                    id VARCHAR(24) PRIMARY KEY,
                    title VARCHAR(500) NOT NULL,
                    artifact_type VARCHAR(20) NOT NULL
                        CHECK (artifact_type IN ('EXECUTION', 'TESTCASE')),
                    execution_id VARCHAR(24),
                    test_case_id VARCHAR(24),
                    step_index INTEGER,
                    path VARCHAR(1000) NOT NULL,
                    content_type VARCHAR(255),
                    size_bytes BIGINT NOT NULL DEFAULT 0,
                    actor VARCHAR(255),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    CHECK (
                        (artifact_type = 'EXECUTION' AND execution_id IS NOT NULL)
                        OR (artifact_type = 'TESTCASE' AND test_case_id IS NOT NULL)
                    )
                );

                CREATE INDEX idx_artifacts_execution_id ON artifacts(execution_id)
                    WHERE execution_id IS NOT NULL;
                CREATE INDEX idx_artifacts_test_case_id ON artifacts(test_case_id)
                    WHERE test_case_id IS NOT NULL;
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS artifacts CASCADE;")
            .await?;

        Ok(())
    }
}
