//! Execution lifecycle: creation, reset, field/status/step edits and artifact
//! attachment for a single execution.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{
    Artifact, ArtifactType, AttachArtifactsResponse, AttachedFile, CreateExecutionRequest, Cycle,
    Execution, ExecutionPatch, ExecutionQuery, ExecutionStatus, ExecutionStep, ExecutionType,
    ExecutionUpdate, ObjectId, TestCase, UploadedFile,
};
use crate::services::storage::{ArtifactStorage, artifact_key, content_type_for_filename};
use crate::store::EntityStore;

/// Default per-file artifact size limit (50MB).
pub const DEFAULT_MAX_ARTIFACT_SIZE: usize = 52_428_800;

/// Default number of files accepted by one attach call.
pub const DEFAULT_MAX_FILES_PER_REQUEST: usize = 20;

/// Snapshot a test case into a fresh execution.
///
/// Steps are copied (never referenced) and lose any template artifacts.
/// A non-PENDING initial status stamps the matching timestamps.
pub fn new_execution(
    test_case: &TestCase,
    cycle_id: ObjectId,
    test_set_execution_id: Option<ObjectId>,
    status: ExecutionStatus,
    execution_type: ExecutionType,
    user: &str,
    now: DateTime<Utc>,
) -> Execution {
    Execution {
        id: ObjectId::new(),
        test_case_id: test_case.id,
        cycle_id,
        test_set_execution_id,
        title: test_case.title.clone(),
        description: test_case.description.clone(),
        test_steps: ExecutionStep::snapshot(&test_case.test_steps),
        status,
        execution_type,
        user: Some(user.to_string()),
        created_at: now,
        updated_at: now,
        started_at: (status != ExecutionStatus::Pending).then_some(now),
        finished_at: status.is_terminal().then_some(now),
    }
}

/// Reject names that are empty or could address anything outside the
/// execution's own key prefix.
pub fn validate_artifact_filename(filename: &str) -> AppResult<()> {
    if filename.trim().is_empty() {
        return Err(AppError::InvalidInput("Filename is empty".to_string()));
    }
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(AppError::InvalidInput(format!(
            "Filename '{}' contains a path separator or traversal",
            filename
        )));
    }
    Ok(())
}

fn not_found(id: ObjectId) -> AppError {
    AppError::NotFound(format!("Execution {}", id))
}

/// The execution lifecycle engine.
pub struct ExecutionService {
    store: Arc<dyn EntityStore>,
    storage: Arc<dyn ArtifactStorage>,
    max_artifact_size: usize,
    max_files_per_request: usize,
}

impl ExecutionService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        storage: Arc<dyn ArtifactStorage>,
        max_artifact_size: usize,
    ) -> Self {
        Self {
            store,
            storage,
            max_artifact_size,
            max_files_per_request: DEFAULT_MAX_FILES_PER_REQUEST,
        }
    }

    pub fn with_max_files_per_request(mut self, max_files_per_request: usize) -> Self {
        self.max_files_per_request = max_files_per_request;
        self
    }

    /// Per-file size limit in bytes.
    pub fn max_artifact_size(&self) -> usize {
        self.max_artifact_size
    }

    pub fn max_files_per_request(&self) -> usize {
        self.max_files_per_request
    }

    async fn load(&self, id: ObjectId) -> AppResult<Execution> {
        self.store
            .find_execution(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn load_test_case(&self, id: ObjectId) -> AppResult<TestCase> {
        self.store
            .find_test_case(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test case {}", id)))
    }

    /// Apply a patch and return the stored result.
    async fn patch(&self, id: ObjectId, patch: &ExecutionPatch) -> AppResult<Execution> {
        if self.store.update_execution(id, patch, None).await? == 0 {
            return Err(not_found(id));
        }
        self.load(id).await
    }

    fn check_step_index(execution: &Execution, index: usize) -> AppResult<()> {
        if index >= execution.test_steps.len() {
            return Err(AppError::InvalidInput(format!(
                "Step index {} is out of range for execution {} with {} steps",
                index,
                execution.id,
                execution.test_steps.len()
            )));
        }
        Ok(())
    }

    /// Create an execution from a test case template.
    pub async fn create(&self, user: &str, request: CreateExecutionRequest) -> AppResult<Execution> {
        let test_case_id =
            ObjectId::parse_required(request.test_case_id.as_deref(), "testCaseId")?;
        let cycle_id = ObjectId::parse_required(request.cycle_id.as_deref(), "cycleId")?;
        let test_set_execution_id = request
            .test_set_execution_id
            .as_deref()
            .map(ObjectId::parse)
            .transpose()?;

        let test_case = self.load_test_case(test_case_id).await?;
        let execution = new_execution(
            &test_case,
            cycle_id,
            test_set_execution_id,
            request.status.unwrap_or_default(),
            request.execution_type.unwrap_or_default(),
            user,
            Utc::now(),
        );

        self.store.insert_execution(&execution).await?;

        info!(
            "Execution {} created from test case {} ({} steps) by {}",
            execution.id,
            test_case_id,
            execution.test_steps.len(),
            user
        );

        Ok(execution)
    }

    pub async fn get(&self, id: ObjectId) -> AppResult<Execution> {
        self.load(id).await
    }

    pub async fn list(&self, query: &ExecutionQuery) -> AppResult<Vec<Execution>> {
        self.store.find_executions(query).await
    }

    /// Return an execution to its pristine state using the current template.
    pub async fn reset(&self, id: ObjectId, user: &str) -> AppResult<Execution> {
        let execution = self.load(id).await?;
        let test_case = self
            .store
            .find_test_case(execution.test_case_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Test case {} referenced by execution {}",
                    execution.test_case_id, id
                ))
            })?;

        let patch = ExecutionPatch {
            test_steps: Some(ExecutionStep::snapshot(&test_case.test_steps)),
            status: Some(ExecutionStatus::Pending),
            started_at: Some(None),
            finished_at: Some(None),
            user: Some(user.to_string()),
            ..ExecutionPatch::touch(Utc::now())
        };
        let execution = self.patch(id, &patch).await?;

        info!(
            "Execution {} reset to {} steps by {}",
            id,
            execution.test_steps.len(),
            user
        );

        Ok(execution)
    }

    /// Merge allow-listed fields. Step content and ownership never change here.
    pub async fn update_fields(
        &self,
        id: ObjectId,
        update: ExecutionUpdate,
        user: &str,
    ) -> AppResult<Execution> {
        let patch = update.into_patch(user, Utc::now());
        self.patch(id, &patch).await
    }

    /// Set the top-level status. Any transition is accepted.
    pub async fn update_status(
        &self,
        id: ObjectId,
        status: ExecutionStatus,
        user: &str,
    ) -> AppResult<Execution> {
        let current = self.load(id).await?;
        let now = Utc::now();

        let mut patch = ExecutionPatch {
            status: Some(status),
            user: Some(user.to_string()),
            ..ExecutionPatch::touch(now)
        };
        match status {
            ExecutionStatus::Pending => patch.finished_at = Some(None),
            ExecutionStatus::Working if current.started_at.is_none() => {
                patch.started_at = Some(Some(now));
            }
            s if s.is_terminal() => patch.finished_at = Some(Some(now)),
            _ => {}
        }

        let execution = self.patch(id, &patch).await?;
        info!(
            "Execution {} status {} -> {} by {}",
            id, current.status, status, user
        );
        Ok(execution)
    }

    /// Replace the whole step at `index`.
    pub async fn update_step(
        &self,
        id: ObjectId,
        index: usize,
        step: ExecutionStep,
    ) -> AppResult<Execution> {
        let execution = self.load(id).await?;
        Self::check_step_index(&execution, index)?;

        if self
            .store
            .set_execution_step(id, index, &step, Utc::now())
            .await?
            == 0
        {
            return Err(not_found(id));
        }
        self.load(id).await
    }

    /// Replace only the status of the step at `index`.
    pub async fn update_step_status(
        &self,
        id: ObjectId,
        index: usize,
        status: ExecutionStatus,
    ) -> AppResult<Execution> {
        let execution = self.load(id).await?;
        Self::check_step_index(&execution, index)?;

        if self
            .store
            .set_execution_step_status(id, index, status, Utc::now())
            .await?
            == 0
        {
            return Err(not_found(id));
        }
        self.load(id).await
    }

    /// Store each file as an EXECUTION artifact of the step at `index`.
    ///
    /// Files are handled independently: a failed file is reported in the
    /// response and does not undo files stored before it.
    pub async fn attach_step_artifacts(
        &self,
        id: ObjectId,
        index: usize,
        files: Vec<UploadedFile>,
        user: &str,
    ) -> AppResult<AttachArtifactsResponse> {
        if files.len() > self.max_files_per_request {
            return Err(AppError::InvalidInput(format!(
                "Too many files: {} (max {} per request)",
                files.len(),
                self.max_files_per_request
            )));
        }

        let execution = self.load(id).await?;
        Self::check_step_index(&execution, index)?;
        let cycle = self
            .store
            .find_cycle(execution.cycle_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cycle {}", execution.cycle_id)))?;

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let filename = file.filename.clone();
            match self.attach_one(&execution, &cycle, index, file, user).await {
                Ok((artifact_id, path)) => {
                    results.push(AttachedFile::stored(filename, artifact_id, path));
                }
                Err(e) => {
                    warn!(
                        "Failed to attach '{}' to execution {} step {}: {}",
                        filename, id, index, e
                    );
                    let message = if e.is_client_error() {
                        e.to_string()
                    } else {
                        "Failed to store artifact".to_string()
                    };
                    results.push(AttachedFile::rejected(filename, message));
                }
            }
        }

        let response = AttachArtifactsResponse::new(results);
        info!(
            "Attached {}/{} artifacts to execution {} step {}",
            response.files.iter().filter(|f| f.success).count(),
            response.files.len(),
            id,
            index
        );
        Ok(response)
    }

    async fn attach_one(
        &self,
        execution: &Execution,
        cycle: &Cycle,
        index: usize,
        file: UploadedFile,
        user: &str,
    ) -> AppResult<(ObjectId, String)> {
        validate_artifact_filename(&file.filename)?;
        if file.data.len() > self.max_artifact_size {
            return Err(AppError::InvalidInput(format!(
                "File exceeds the {} byte limit",
                self.max_artifact_size
            )));
        }

        let artifact_id = ObjectId::new();
        let path = artifact_key(
            cycle.project_id,
            cycle.id,
            execution.id,
            artifact_id,
            &file.filename,
        );
        let content_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for_filename(&file.filename).to_string());
        let size_bytes = file.data.len() as i64;

        self.storage
            .put(&path, file.data, Some(&content_type))
            .await?;

        let now = Utc::now();
        let artifact = Artifact {
            id: artifact_id,
            title: file.filename,
            artifact_type: ArtifactType::Execution,
            execution_id: Some(execution.id),
            test_case_id: None,
            step_index: Some(index as i32),
            path: path.clone(),
            content_type: Some(content_type),
            size_bytes,
            user: Some(user.to_string()),
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.record_artifact(execution.id, index, &artifact).await {
            self.discard_artifact(artifact_id, &path).await;
            return Err(e);
        }

        Ok((artifact_id, path))
    }

    /// Insert the artifact record and link it to the step.
    async fn record_artifact(
        &self,
        execution_id: ObjectId,
        index: usize,
        artifact: &Artifact,
    ) -> AppResult<()> {
        self.store.insert_artifact(artifact).await?;

        if self
            .store
            .push_execution_step_artifact(execution_id, index, artifact.id, artifact.created_at)
            .await?
            == 0
        {
            return Err(AppError::NotFound(format!(
                "Step {} of execution {}",
                index, execution_id
            )));
        }
        Ok(())
    }

    /// Best-effort removal of a stored file and its record after a failed attach.
    async fn discard_artifact(&self, artifact_id: ObjectId, path: &str) {
        if let Err(e) = self.storage.delete(path).await {
            warn!("Failed to remove orphaned file {}: {}", path, e);
        }
        if let Err(e) = self.store.delete_artifact(artifact_id).await {
            warn!("Failed to remove orphaned artifact {}: {}", artifact_id, e);
        }
    }

    pub async fn delete(&self, id: ObjectId) -> AppResult<()> {
        if self.store.delete_execution(id).await? == 0 {
            return Err(not_found(id));
        }
        info!("Execution {} deleted", id);
        Ok(())
    }

    /// Remove an artifact record and, best-effort, its stored file.
    pub async fn delete_artifact(&self, id: ObjectId) -> AppResult<()> {
        let artifact = self
            .store
            .find_artifact(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Artifact {}", id)))?;

        if let Err(e) = self.storage.delete(&artifact.path).await {
            warn!("Failed to delete stored file {}: {}", artifact.path, e);
        }

        if self.store.delete_artifact(id).await? == 0 {
            return Err(AppError::NotFound(format!("Artifact {}", id)));
        }
        info!("Artifact {} deleted", id);
        Ok(())
    }
}
