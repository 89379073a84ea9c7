//! In-process entity store.
//!
//! Backs `DATABASE_URL=memory://` development runs and the test suite. A
//! single mutex guards every collection, so each trait call is atomic.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{EntityStore, PoolDispense};
use crate::error::{AppError, AppResult};
use crate::models::{
    Artifact, Cycle, Execution, ExecutionPatch, ExecutionQuery, ExecutionStatus, ExecutionStep,
    ObjectId, TestCase, TestSet, TestSetExecution, TestSetExecutionStatus,
};

#[derive(Default)]
struct Collections {
    cycles: BTreeMap<ObjectId, Cycle>,
    test_cases: BTreeMap<ObjectId, TestCase>,
    test_sets: BTreeMap<ObjectId, TestSet>,
    executions: BTreeMap<ObjectId, Execution>,
    test_set_executions: BTreeMap<ObjectId, TestSetExecution>,
    artifacts: BTreeMap<ObjectId, Artifact>,
}

/// Mutex-guarded collections keyed by id.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Collections>> {
        self.inner
            .lock()
            .map_err(|_| AppError::Database("Memory store mutex poisoned".to_string()))
    }

    /// Seed or replace a cycle.
    pub fn put_cycle(&self, cycle: Cycle) -> AppResult<()> {
        self.lock()?.cycles.insert(cycle.id, cycle);
        Ok(())
    }

    /// Seed or replace a test case template.
    pub fn put_test_case(&self, test_case: TestCase) -> AppResult<()> {
        self.lock()?.test_cases.insert(test_case.id, test_case);
        Ok(())
    }

    /// Remove a test case template.
    pub fn remove_test_case(&self, id: ObjectId) -> AppResult<bool> {
        Ok(self.lock()?.test_cases.remove(&id).is_some())
    }

    /// Seed or replace a test set.
    pub fn put_test_set(&self, test_set: TestSet) -> AppResult<()> {
        self.lock()?.test_sets.insert(test_set.id, test_set);
        Ok(())
    }

    fn with_step<F>(&self, id: ObjectId, index: usize, now: DateTime<Utc>, f: F) -> AppResult<u64>
    where
        F: FnOnce(&mut ExecutionStep),
    {
        let mut guard = self.lock()?;
        let Some(execution) = guard.executions.get_mut(&id) else {
            return Ok(0);
        };
        let Some(step) = execution.test_steps.get_mut(index) else {
            return Ok(0);
        };
        f(step);
        execution.updated_at = now;
        Ok(1)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        self.lock().map(|_| ())
    }

    async fn find_test_case(&self, id: ObjectId) -> AppResult<Option<TestCase>> {
        Ok(self.lock()?.test_cases.get(&id).cloned())
    }

    async fn find_test_set(&self, id: ObjectId) -> AppResult<Option<TestSet>> {
        Ok(self.lock()?.test_sets.get(&id).cloned())
    }

    async fn find_cycle(&self, id: ObjectId) -> AppResult<Option<Cycle>> {
        Ok(self.lock()?.cycles.get(&id).cloned())
    }

    async fn find_execution(&self, id: ObjectId) -> AppResult<Option<Execution>> {
        Ok(self.lock()?.executions.get(&id).cloned())
    }

    async fn find_executions(&self, query: &ExecutionQuery) -> AppResult<Vec<Execution>> {
        let guard = self.lock()?;
        Ok(guard
            .executions
            .values()
            .filter(|e| query.matches(e))
            .skip(query.offset() as usize)
            .take(query.clamped_limit() as usize)
            .cloned()
            .collect())
    }

    async fn insert_execution(&self, execution: &Execution) -> AppResult<()> {
        let mut guard = self.lock()?;
        if guard.executions.contains_key(&execution.id) {
            return Err(AppError::Database(format!(
                "Duplicate execution id {}",
                execution.id
            )));
        }
        guard.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(
        &self,
        id: ObjectId,
        patch: &ExecutionPatch,
        expected_status: Option<ExecutionStatus>,
    ) -> AppResult<u64> {
        let mut guard = self.lock()?;
        match guard.executions.get_mut(&id) {
            Some(execution) if expected_status.is_none_or(|s| execution.status == s) => {
                patch.apply_to(execution);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn set_execution_step(
        &self,
        id: ObjectId,
        index: usize,
        step: &ExecutionStep,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.with_step(id, index, now, |slot| *slot = step.clone())
    }

    async fn set_execution_step_status(
        &self,
        id: ObjectId,
        index: usize,
        status: ExecutionStatus,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.with_step(id, index, now, |slot| slot.status = status)
    }

    async fn push_execution_step_artifact(
        &self,
        id: ObjectId,
        index: usize,
        artifact_id: ObjectId,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.with_step(id, index, now, |slot| slot.artifacts.push(artifact_id))
    }

    async fn delete_execution(&self, id: ObjectId) -> AppResult<u64> {
        Ok(self.lock()?.executions.remove(&id).map_or(0, |_| 1))
    }

    async fn insert_test_set_execution(
        &self,
        run: &TestSetExecution,
        executions: &[Execution],
    ) -> AppResult<()> {
        let mut guard = self.lock()?;
        if guard.test_set_executions.contains_key(&run.id)
            || executions
                .iter()
                .any(|e| guard.executions.contains_key(&e.id))
        {
            return Err(AppError::Database(format!(
                "Duplicate id while spawning test set execution {}",
                run.id
            )));
        }
        guard.test_set_executions.insert(run.id, run.clone());
        for execution in executions {
            guard.executions.insert(execution.id, execution.clone());
        }
        Ok(())
    }

    async fn find_test_set_execution(&self, id: ObjectId) -> AppResult<Option<TestSetExecution>> {
        Ok(self.lock()?.test_set_executions.get(&id).cloned())
    }

    async fn claim_next_execution(
        &self,
        run_id: ObjectId,
        now: DateTime<Utc>,
    ) -> AppResult<PoolDispense> {
        let mut guard = self.lock()?;
        let collections = &mut *guard;
        let Some(run) = collections.test_set_executions.get_mut(&run_id) else {
            return Ok(PoolDispense::UnknownRun);
        };
        if run.status == TestSetExecutionStatus::Abandoned {
            return Ok(PoolDispense::Abandoned);
        }

        let next = collections.executions.values_mut().find(|e| {
            e.test_set_execution_id == Some(run_id) && e.status == ExecutionStatus::Pending
        });
        match next {
            Some(execution) => {
                execution.status = ExecutionStatus::Working;
                execution.started_at = Some(now);
                execution.updated_at = now;

                run.status = TestSetExecutionStatus::Running;
                run.finished_at = None;
                run.started_at.get_or_insert(now);
                run.updated_at = now;

                Ok(PoolDispense::Claimed(execution.clone()))
            }
            None => {
                let newly_finished = run.status != TestSetExecutionStatus::Finished;
                run.status = TestSetExecutionStatus::Finished;
                run.finished_at.get_or_insert(now);
                run.updated_at = now;
                Ok(PoolDispense::Exhausted { newly_finished })
            }
        }
    }

    async fn has_pending_execution(&self, run_id: ObjectId) -> AppResult<bool> {
        Ok(self.lock()?.executions.values().any(|e| {
            e.test_set_execution_id == Some(run_id) && e.status == ExecutionStatus::Pending
        }))
    }

    async fn execution_status_counts(
        &self,
        run_id: ObjectId,
    ) -> AppResult<Vec<(ExecutionStatus, u64)>> {
        let guard = self.lock()?;
        Ok(ExecutionStatus::ALL
            .iter()
            .map(|&status| {
                let count = guard
                    .executions
                    .values()
                    .filter(|e| e.test_set_execution_id == Some(run_id) && e.status == status)
                    .count() as u64;
                (status, count)
            })
            .filter(|&(_, count)| count > 0)
            .collect())
    }

    async fn abandon_test_set_execution(
        &self,
        run_id: ObjectId,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut guard = self.lock()?;
        match guard.test_set_executions.get_mut(&run_id) {
            Some(run) => {
                run.status = TestSetExecutionStatus::Abandoned;
                run.finished_at.get_or_insert(now);
                run.updated_at = now;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn release_stale_claims(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut guard = self.lock()?;
        let mut released = 0;
        for execution in guard.executions.values_mut() {
            if execution.test_set_execution_id.is_some()
                && execution.status == ExecutionStatus::Working
                && execution.updated_at < cutoff
            {
                execution.status = ExecutionStatus::Pending;
                execution.started_at = None;
                execution.updated_at = now;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn insert_artifact(&self, artifact: &Artifact) -> AppResult<()> {
        self.lock()?.artifacts.insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn find_artifact(&self, id: ObjectId) -> AppResult<Option<Artifact>> {
        Ok(self.lock()?.artifacts.get(&id).cloned())
    }

    async fn delete_artifact(&self, id: ObjectId) -> AppResult<u64> {
        Ok(self.lock()?.artifacts.remove(&id).map_or(0, |_| 1))
    }
}
