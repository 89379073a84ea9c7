//! Business logic services.

pub mod claim_reaper;
pub mod executions;
pub mod storage;
pub mod test_set_pool;

pub use claim_reaper::{ClaimReaperConfig, start_claim_reaper};
pub use executions::ExecutionService;
pub use storage::{ArtifactStorage, LocalStorage, S3Storage};
pub use test_set_pool::PoolManager;
