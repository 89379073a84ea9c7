//! Artifact entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "artifacts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: String,
    /// EXECUTION or TESTCASE
    pub artifact_type: String,
    pub execution_id: Option<String>,
    pub test_case_id: Option<String>,
    pub step_index: Option<i32>,
    /// Storage key (S3 object key or path under the artifact dir)
    pub path: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub actor: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
