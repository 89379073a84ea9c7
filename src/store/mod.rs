//! Entity store seam.
//!
//! The execution engine and the pool manager only talk to persistence
//! through [`EntityStore`]. `DbPool` (PostgreSQL) and [`MemoryStore`]
//! implement it; services receive an `Arc<dyn EntityStore>` at construction.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::models::{
    Artifact, Cycle, Execution, ExecutionPatch, ExecutionQuery, ExecutionStatus, ExecutionStep,
    ObjectId, TestCase, TestSet, TestSetExecution,
};

pub use memory::MemoryStore;

/// Outcome of [`EntityStore::claim_next_execution`].
#[derive(Debug, Clone, PartialEq)]
pub enum PoolDispense {
    /// The execution is now WORKING and the run RUNNING.
    Claimed(Execution),
    /// Nothing was PENDING; the run is FINISHED. `newly_finished` is false
    /// when it already was.
    Exhausted { newly_finished: bool },
    /// The run is ABANDONED.
    Abandoned,
    UnknownRun,
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Connectivity probe.
    async fn ping(&self) -> AppResult<()>;

    async fn find_test_case(&self, id: ObjectId) -> AppResult<Option<TestCase>>;

    async fn find_test_set(&self, id: ObjectId) -> AppResult<Option<TestSet>>;

    async fn find_cycle(&self, id: ObjectId) -> AppResult<Option<Cycle>>;

    async fn find_execution(&self, id: ObjectId) -> AppResult<Option<Execution>>;

    /// Filtered page of executions, ordered by id.
    async fn find_executions(&self, query: &ExecutionQuery) -> AppResult<Vec<Execution>>;

    async fn insert_execution(&self, execution: &Execution) -> AppResult<()>;

    /// Apply a patch. When `expected_status` is given the write only matches
    /// while the stored status still equals it. Returns the matched count.
    async fn update_execution(
        &self,
        id: ObjectId,
        patch: &ExecutionPatch,
        expected_status: Option<ExecutionStatus>,
    ) -> AppResult<u64>;

    /// Replace the step at `index`. Matches only when the index is in range.
    async fn set_execution_step(
        &self,
        id: ObjectId,
        index: usize,
        step: &ExecutionStep,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Replace only the status of the step at `index`.
    async fn set_execution_step_status(
        &self,
        id: ObjectId,
        index: usize,
        status: ExecutionStatus,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Append an artifact id to the step at `index`.
    async fn push_execution_step_artifact(
        &self,
        id: ObjectId,
        index: usize,
        artifact_id: ObjectId,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    async fn delete_execution(&self, id: ObjectId) -> AppResult<u64>;

    /// Persist a run together with its spawned executions, all or nothing.
    async fn insert_test_set_execution(
        &self,
        run: &TestSetExecution,
        executions: &[Execution],
    ) -> AppResult<()>;

    async fn find_test_set_execution(&self, id: ObjectId) -> AppResult<Option<TestSetExecution>>;

    /// Dispense the next PENDING execution of a run.
    ///
    /// The claim and the run's state change form one atomic step: a
    /// successful claim leaves the run RUNNING, an empty pool leaves it
    /// FINISHED, and an ABANDONED run is left untouched. Two concurrent
    /// callers never receive the same execution.
    async fn claim_next_execution(
        &self,
        run_id: ObjectId,
        now: DateTime<Utc>,
    ) -> AppResult<PoolDispense>;

    async fn has_pending_execution(&self, run_id: ObjectId) -> AppResult<bool>;

    async fn execution_status_counts(
        &self,
        run_id: ObjectId,
    ) -> AppResult<Vec<(ExecutionStatus, u64)>>;

    async fn abandon_test_set_execution(
        &self,
        run_id: ObjectId,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Revert WORKING pool executions untouched since `cutoff` to PENDING.
    async fn release_stale_claims(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    async fn insert_artifact(&self, artifact: &Artifact) -> AppResult<()>;

    async fn find_artifact(&self, id: ObjectId) -> AppResult<Option<Artifact>>;

    async fn delete_artifact(&self, id: ObjectId) -> AppResult<u64>;
}
