//! Database queries for artifacts.

use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use crate::entity::artifact::{self, ActiveModel, Entity as ArtifactEntity};
use crate::error::{AppError, AppResult};
use crate::models::{Artifact, ArtifactType, ObjectId};

use super::{DbPool, stored_id, stored_opt_id};

fn to_artifact(model: artifact::Model) -> AppResult<Artifact> {
    let artifact_type = ArtifactType::parse(&model.artifact_type).ok_or_else(|| {
        AppError::Database(format!(
            "Artifact {} has unknown type '{}'",
            model.id, model.artifact_type
        ))
    })?;

    Ok(Artifact {
        id: stored_id(&model.id, "artifact")?,
        title: model.title,
        artifact_type,
        execution_id: stored_opt_id(model.execution_id.as_deref(), "execution")?,
        test_case_id: stored_opt_id(model.test_case_id.as_deref(), "test case")?,
        step_index: model.step_index,
        path: model.path,
        content_type: model.content_type,
        size_bytes: model.size_bytes,
        user: model.actor,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

impl DbPool {
    /// Insert artifact metadata.
    pub async fn insert_artifact(&self, artifact: &Artifact) -> AppResult<()> {
        let model = ActiveModel {
            id: Set(artifact.id.to_string()),
            title: Set(artifact.title.clone()),
            artifact_type: Set(artifact.artifact_type.as_str().to_string()),
            execution_id: Set(artifact.execution_id.map(|id| id.to_string())),
            test_case_id: Set(artifact.test_case_id.map(|id| id.to_string())),
            step_index: Set(artifact.step_index),
            path: Set(artifact.path.clone()),
            content_type: Set(artifact.content_type.clone()),
            size_bytes: Set(artifact.size_bytes),
            actor: Set(artifact.user.clone()),
            created_at: Set(artifact.created_at),
            updated_at: Set(artifact.updated_at),
        };

        model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert artifact: {}", e)))?;

        Ok(())
    }

    /// Get artifact metadata by ID.
    pub async fn get_artifact(&self, id: ObjectId) -> AppResult<Option<Artifact>> {
        let result = ArtifactEntity::find_by_id(id.to_string())
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get artifact: {}", e)))?;

        result.map(to_artifact).transpose()
    }

    /// Delete artifact metadata.
    pub async fn delete_artifact(&self, id: ObjectId) -> AppResult<u64> {
        let result = ArtifactEntity::delete_by_id(id.to_string())
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete artifact: {}", e)))?;

        Ok(result.rows_affected)
    }
}
