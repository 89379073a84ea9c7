//! Execution entity for SeaORM.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "executions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub test_case_id: String,
    pub cycle_id: String,
    pub test_set_execution_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    /// Snapshot `[{action, payload, expected, status, comment, artifacts}]`
    #[sea_orm(column_type = "JsonBinary")]
    pub test_steps: JsonValue,
    /// PENDING, WORKING, SUCCESSFUL, FAILED, WARNING
    pub status: String,
    /// MANUAL, AUTOMATED
    pub execution_type: String,
    pub actor: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub finished_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::test_set_execution::Entity",
        from = "Column::TestSetExecutionId",
        to = "super::test_set_execution::Column::Id",
        on_delete = "Cascade"
    )]
    TestSetExecution,
}

impl Related<super::test_set_execution::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TestSetExecution.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
