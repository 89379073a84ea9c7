//! Domain models for the test case management server.

pub mod artifact;
pub mod execution;
pub mod id;
pub mod template;
pub mod test_set_execution;

// Re-export commonly used types
pub use artifact::{
    Artifact, ArtifactType, AttachArtifactsResponse, AttachedFile, UploadedFile,
};
pub use execution::{
    CreateExecutionRequest, Execution, ExecutionPatch, ExecutionQuery, ExecutionStatus,
    ExecutionStep, ExecutionType, ExecutionUpdate, StatusRequest,
};
pub use id::ObjectId;
pub use template::{Cycle, TestCase, TestSet, TestStep};
pub use test_set_execution::{
    Claim, ClaimResponse, HasPendingResponse, PoolProgress, SpawnTestSetExecutionRequest,
    TestSetExecution, TestSetExecutionDetail, TestSetExecutionStatus,
};
