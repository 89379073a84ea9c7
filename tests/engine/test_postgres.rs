//! PostgreSQL entity store.
//!
//! Runs only when `DATABASE_URL` points at a PostgreSQL server; otherwise
//! each test returns early. Every test seeds its own project and cycle, so
//! the suite can share one database.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::OnceCell;

use tcms_lib::db::DbPool;
use tcms_lib::entity::{cycle, test_case, test_set};
use tcms_lib::error::AppError;
use tcms_lib::models::{
    Claim, CreateExecutionRequest, Cycle, ExecutionQuery, ExecutionStatus, ExecutionType, ObjectId,
    SpawnTestSetExecutionRequest, TestCase, TestSet, TestSetExecution, TestSetExecutionStatus,
};
use tcms_lib::services::executions::new_execution;
use tcms_lib::services::{ExecutionService, LocalStorage, PoolManager};
use tcms_lib::store::EntityStore;

use super::test_helpers::{TEST_MAX_ARTIFACT_SIZE, make_steps};

static MIGRATIONS_RUN: OnceCell<()> = OnceCell::const_new();

/// Connect to the test database, or `None` when none is configured.
/// Migrations run only once.
async fn create_test_pool() -> Option<Arc<DbPool>> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if url.starts_with("postgres") => url,
        _ => {
            eprintln!("DATABASE_URL is not a PostgreSQL URL, skipping");
            return None;
        }
    };

    let pool = DbPool::connect(&url, 4)
        .await
        .expect("Failed to connect to database");

    MIGRATIONS_RUN
        .get_or_init(|| async {
            pool.run_migrations()
                .await
                .expect("Failed to run migrations");
        })
        .await;

    Some(Arc::new(pool))
}

/// Templates seeded through the CRUD-owned tables.
struct Seed {
    pool: Arc<DbPool>,
    cycle: Cycle,
}

impl Seed {
    async fn new(pool: Arc<DbPool>) -> Self {
        let now = Utc::now();
        let cycle = Cycle {
            id: ObjectId::new(),
            project_id: ObjectId::new(),
            name: "Nightly".to_string(),
            created_at: now,
        };
        cycle::ActiveModel {
            id: Set(cycle.id.to_string()),
            project_id: Set(cycle.project_id.to_string()),
            name: Set(cycle.name.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(pool.connection())
        .await
        .unwrap();

        Self { pool, cycle }
    }

    async fn test_case(&self, title: &str, steps: usize) -> TestCase {
        let now = Utc::now();
        let test_case = TestCase {
            id: ObjectId::new(),
            project_id: self.cycle.project_id,
            parent_id: None,
            title: title.to_string(),
            description: None,
            test_steps: make_steps(steps),
            created_at: now,
            updated_at: now,
        };
        test_case::ActiveModel {
            id: Set(test_case.id.to_string()),
            project_id: Set(test_case.project_id.to_string()),
            parent_id: Set(None),
            title: Set(test_case.title.clone()),
            description: Set(None),
            test_steps: Set(serde_json::to_value(&test_case.test_steps).unwrap()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.pool.connection())
        .await
        .unwrap();
        test_case
    }

    async fn test_set(&self, test_case_ids: &[ObjectId]) -> TestSet {
        let now = Utc::now();
        let test_set = TestSet {
            id: ObjectId::new(),
            project_id: self.cycle.project_id,
            cycle_id: self.cycle.id,
            title: "Regression".to_string(),
            test_cases: test_case_ids.to_vec(),
            created_at: now,
            updated_at: now,
        };
        let ids: Vec<String> = test_case_ids.iter().map(ObjectId::to_string).collect();
        test_set::ActiveModel {
            id: Set(test_set.id.to_string()),
            project_id: Set(test_set.project_id.to_string()),
            cycle_id: Set(test_set.cycle_id.to_string()),
            title: Set(test_set.title.clone()),
            test_cases: Set(serde_json::to_value(ids).unwrap()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.pool.connection())
        .await
        .unwrap();
        test_set
    }

    async fn spawn_run(&self, manager: &PoolManager, count: usize) -> TestSetExecution {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            ids.push(self.test_case(&format!("Case {}", i), 2).await.id);
        }
        let test_set = self.test_set(&ids).await;
        manager
            .spawn(self.spawn_request(test_set.id), "lead")
            .await
            .unwrap()
    }

    fn spawn_request(&self, test_set_id: ObjectId) -> SpawnTestSetExecutionRequest {
        SpawnTestSetExecutionRequest {
            test_set_id: Some(test_set_id.to_string()),
            project_id: Some(self.cycle.project_id.to_string()),
            cycle_id: None,
        }
    }

    fn executions_in_cycle(&self) -> ExecutionQuery {
        ExecutionQuery {
            cycle_id: Some(self.cycle.id),
            ..Default::default()
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pg_concurrent_claims_are_distinct() {
    let Some(pool) = create_test_pool().await else {
        return;
    };
    let seed = Seed::new(pool.clone()).await;
    let manager = Arc::new(PoolManager::new(pool.clone()));
    let run = seed.spawn_run(&manager, 6).await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move { manager.claim_next(run.id).await }));
    }

    let mut ids = HashSet::new();
    let mut ends = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Claim::Claimed(execution) => {
                assert_eq!(execution.status, ExecutionStatus::Working);
                assert!(ids.insert(execution.id), "double claim");
            }
            Claim::EndOfPool => ends += 1,
        }
    }
    assert_eq!(ids.len(), 6);
    assert_eq!(ends, 6);

    let detail = manager.get(run.id).await.unwrap();
    assert_eq!(detail.run.status, TestSetExecutionStatus::Finished);
    assert!(detail.run.finished_at.is_some());
    assert_eq!(detail.progress.working, 6);
    assert_eq!(detail.progress.pending, 0);
}

#[actix_rt::test]
async fn test_pg_run_started_at_is_set_once() {
    let Some(pool) = create_test_pool().await else {
        return;
    };
    let seed = Seed::new(pool.clone()).await;
    let manager = PoolManager::new(pool.clone());
    let run = seed.spawn_run(&manager, 2).await;
    assert_eq!(run.status, TestSetExecutionStatus::Planned);

    assert!(matches!(
        manager.claim_next(run.id).await.unwrap(),
        Claim::Claimed(_)
    ));
    let first = manager.get(run.id).await.unwrap().run;
    assert_eq!(first.status, TestSetExecutionStatus::Running);
    assert!(first.started_at.is_some());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(matches!(
        manager.claim_next(run.id).await.unwrap(),
        Claim::Claimed(_)
    ));
    assert_eq!(manager.claim_next(run.id).await.unwrap(), Claim::EndOfPool);

    let last = manager.get(run.id).await.unwrap().run;
    assert_eq!(last.status, TestSetExecutionStatus::Finished);
    assert_eq!(last.started_at, first.started_at);
}

#[actix_rt::test]
async fn test_pg_step_writes_respect_bounds() {
    let Some(pool) = create_test_pool().await else {
        return;
    };
    let seed = Seed::new(pool.clone()).await;
    let artifact_dir = tempfile::tempdir().unwrap();
    let service = ExecutionService::new(
        pool.clone(),
        Arc::new(LocalStorage::new(artifact_dir.path())),
        TEST_MAX_ARTIFACT_SIZE,
    );
    let template = seed.test_case("Bounds", 2).await;
    let execution = service
        .create(
            "carol",
            CreateExecutionRequest {
                test_case_id: Some(template.id.to_string()),
                cycle_id: Some(seed.cycle.id.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let now = Utc::now();

    for index in [2, 7] {
        assert_eq!(
            pool.set_execution_step_status(execution.id, index, ExecutionStatus::Failed, now)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            pool.set_execution_step(execution.id, index, &execution.test_steps[0], now)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            pool.push_execution_step_artifact(execution.id, index, ObjectId::new(), now)
                .await
                .unwrap(),
            0
        );
    }
    assert!(matches!(
        service
            .update_step_status(execution.id, 2, ExecutionStatus::Failed)
            .await,
        Err(AppError::InvalidInput(_))
    ));

    let artifact_id = ObjectId::new();
    assert_eq!(
        pool.push_execution_step_artifact(execution.id, 1, artifact_id, now)
            .await
            .unwrap(),
        1
    );
    let updated = service
        .update_step_status(execution.id, 1, ExecutionStatus::Warning)
        .await
        .unwrap();
    assert_eq!(updated.test_steps.len(), 2);
    assert_eq!(updated.test_steps[1].status, ExecutionStatus::Warning);
    assert_eq!(updated.test_steps[1].artifacts, vec![artifact_id]);
    assert_eq!(updated.test_steps[0].status, ExecutionStatus::Pending);
}

#[actix_rt::test]
async fn test_pg_spawn_with_missing_test_case_persists_nothing() {
    let Some(pool) = create_test_pool().await else {
        return;
    };
    let seed = Seed::new(pool.clone()).await;
    let manager = PoolManager::new(pool.clone());
    let present = seed.test_case("Present", 1).await;
    let test_set = seed.test_set(&[present.id, ObjectId::new()]).await;

    assert!(matches!(
        manager.spawn(seed.spawn_request(test_set.id), "lead").await,
        Err(AppError::NotFound(_))
    ));
    assert!(
        pool.find_executions(&seed.executions_in_cycle())
            .await
            .unwrap()
            .is_empty()
    );
}

#[actix_rt::test]
async fn test_pg_run_insert_is_all_or_nothing() {
    let Some(pool) = create_test_pool().await else {
        return;
    };
    let seed = Seed::new(pool.clone()).await;
    let template = seed.test_case("Twice", 1).await;
    let test_set = seed.test_set(&[template.id]).await;
    let now = Utc::now();

    let run = TestSetExecution {
        id: ObjectId::new(),
        test_set_id: test_set.id,
        project_id: seed.cycle.project_id,
        cycle_id: seed.cycle.id,
        status: TestSetExecutionStatus::Planned,
        user: Some("lead".to_string()),
        created_at: now,
        updated_at: now,
        started_at: None,
        finished_at: None,
    };
    let execution = new_execution(
        &template,
        seed.cycle.id,
        Some(run.id),
        ExecutionStatus::Pending,
        ExecutionType::Manual,
        "lead",
        now,
    );

    // The duplicate id fails the second row after the first was written
    let result = pool
        .insert_test_set_execution(&run, &[execution.clone(), execution.clone()])
        .await;
    assert!(matches!(result, Err(AppError::Database(_))));

    assert!(pool.find_test_set_execution(run.id).await.unwrap().is_none());
    assert!(pool.find_execution(execution.id).await.unwrap().is_none());
}
