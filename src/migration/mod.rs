//! SeaORM database migrations.

pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_projects_and_cycles;
mod m20261001_000002_create_test_cases;
mod m20261001_000003_create_test_sets;
mod m20261001_000004_create_test_set_executions;
mod m20261001_000005_create_executions;
mod m20261001_000006_create_artifacts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_projects_and_cycles::Migration),
            Box::new(m20261001_000002_create_test_cases::Migration),
            Box::new(m20261001_000003_create_test_sets::Migration),
            Box::new(m20261001_000004_create_test_set_executions::Migration),
            Box::new(m20261001_000005_create_executions::Migration),
            Box::new(m20261001_000006_create_artifacts::Migration),
        ]
    }
}
