//! Test-set execution pools.
//!
//! A run fans out one PENDING execution per test case of its test set;
//! workers then take them one at a time through [`PoolManager::claim_next`].
//! Dispensing relies on the store's atomic claim, so two workers never
//! receive the same execution and losing a race is not an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::{
    Claim, ExecutionStatus, ExecutionType, ObjectId, PoolProgress, SpawnTestSetExecutionRequest,
    TestSetExecution, TestSetExecutionDetail, TestSetExecutionStatus,
};
use crate::services::executions::new_execution;
use crate::store::{EntityStore, PoolDispense};

fn not_found(id: ObjectId) -> AppError {
    AppError::NotFound(format!("Test set execution {}", id))
}

pub struct PoolManager {
    store: Arc<dyn EntityStore>,
}

impl PoolManager {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    async fn load(&self, id: ObjectId) -> AppResult<TestSetExecution> {
        self.store
            .find_test_set_execution(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Create a run and its pool of PENDING executions.
    ///
    /// The pool mirrors the test set's case list at this moment. Every
    /// referenced test case must exist; nothing is persisted otherwise.
    pub async fn spawn(
        &self,
        request: SpawnTestSetExecutionRequest,
        user: &str,
    ) -> AppResult<TestSetExecution> {
        let test_set_id = ObjectId::parse_required(request.test_set_id.as_deref(), "testSetId")?;
        let project_id = ObjectId::parse_required(request.project_id.as_deref(), "projectId")?;
        let cycle_id = request
            .cycle_id
            .as_deref()
            .map(ObjectId::parse)
            .transpose()?;

        let test_set = self
            .store
            .find_test_set(test_set_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test set {}", test_set_id)))?;
        let cycle_id = cycle_id.unwrap_or(test_set.cycle_id);

        let now = Utc::now();
        let run = TestSetExecution {
            id: ObjectId::new(),
            test_set_id,
            project_id,
            cycle_id,
            status: TestSetExecutionStatus::Planned,
            user: Some(user.to_string()),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        };

        let mut executions = Vec::with_capacity(test_set.test_cases.len());
        for test_case_id in &test_set.test_cases {
            let test_case = self
                .store
                .find_test_case(*test_case_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "Test case {} of test set {}",
                        test_case_id, test_set_id
                    ))
                })?;
            executions.push(new_execution(
                &test_case,
                cycle_id,
                Some(run.id),
                ExecutionStatus::Pending,
                ExecutionType::Manual,
                user,
                now,
            ));
        }

        self.store
            .insert_test_set_execution(&run, &executions)
            .await?;

        info!(
            "Test set execution {} spawned from test set {} with {} executions by {}",
            run.id,
            test_set_id,
            executions.len(),
            user
        );

        Ok(run)
    }

    /// Hand the next PENDING execution of the run to the caller.
    ///
    /// An exhausted pool finishes the run. Abandoned runs dispense nothing.
    pub async fn claim_next(&self, run_id: ObjectId) -> AppResult<Claim> {
        match self.store.claim_next_execution(run_id, Utc::now()).await? {
            PoolDispense::Claimed(execution) => {
                debug!(
                    "Execution {} claimed from test set execution {}",
                    execution.id, run_id
                );
                Ok(Claim::Claimed(Box::new(execution)))
            }
            PoolDispense::Exhausted { newly_finished } => {
                if newly_finished {
                    info!("Test set execution {} finished", run_id);
                }
                Ok(Claim::EndOfPool)
            }
            PoolDispense::Abandoned => {
                debug!("Claim on abandoned test set execution {}", run_id);
                Ok(Claim::EndOfPool)
            }
            PoolDispense::UnknownRun => Err(not_found(run_id)),
        }
    }

    /// Whether the run still has something to dispense.
    pub async fn has_pending(&self, run_id: ObjectId) -> AppResult<bool> {
        let run = self.load(run_id).await?;
        if run.status == TestSetExecutionStatus::Abandoned {
            return Ok(false);
        }
        self.store.has_pending_execution(run_id).await
    }

    /// Run details with per-status progress.
    pub async fn get(&self, run_id: ObjectId) -> AppResult<TestSetExecutionDetail> {
        let run = self.load(run_id).await?;
        let counts = self.store.execution_status_counts(run_id).await?;
        Ok(TestSetExecutionDetail {
            run,
            progress: PoolProgress::from_counts(&counts),
        })
    }

    /// Stop dispensing from a run. Its executions are left untouched.
    pub async fn abandon(&self, run_id: ObjectId, user: &str) -> AppResult<TestSetExecution> {
        if self
            .store
            .abandon_test_set_execution(run_id, Utc::now())
            .await?
            == 0
        {
            return Err(not_found(run_id));
        }
        info!("Test set execution {} abandoned by {}", run_id, user);
        self.load(run_id).await
    }

    /// Return claims idle for longer than `timeout` to their pools.
    pub async fn release_stale_claims(&self, timeout: Duration) -> AppResult<u64> {
        let now = Utc::now();
        let cutoff = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|timeout| now.checked_sub_signed(timeout))
            .ok_or_else(|| {
                AppError::InvalidInput(format!("Claim timeout {:?} is out of range", timeout))
            })?;
        let released = self.store.release_stale_claims(cutoff, now).await?;
        if released > 0 {
            info!("Released {} stale claims", released);
        }
        Ok(released)
    }
}
