//! Artifact blob storage.
//!
//! Two backends: S3 (AWS or MinIO in development) and a local directory.
//! The execution engine only sees [`ArtifactStorage`].

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use tracing::info;

use crate::config::S3Config;
use crate::error::{AppError, AppResult};
use crate::models::ObjectId;

#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Store `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> AppResult<()>;

    /// Remove the object under `key`. Removing a missing object is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Build the storage key of an execution artifact.
///
/// Format: `artifacts/{project_id}/{cycle_id}/{execution_id}/{artifact_id}-{filename}`
pub fn artifact_key(
    project_id: ObjectId,
    cycle_id: ObjectId,
    execution_id: ObjectId,
    artifact_id: ObjectId,
    filename: &str,
) -> String {
    format!(
        "artifacts/{}/{}/{}/{}-{}",
        project_id, cycle_id, execution_id, artifact_id, filename
    )
}

/// Get the content type for a file based on its extension.
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webm" => "video/webm",
        "mp4" => "video/mp4",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "txt" | "log" => "text/plain",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

/// Content type guessed from a filename.
pub fn content_type_for_filename(filename: &str) -> &'static str {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(content_type_for_extension)
        .unwrap_or("application/octet-stream")
}

/// S3 storage client wrapper.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3 storage client from configuration.
    pub async fn new(config: &S3Config) -> AppResult<Self> {
        let credentials =
            Credentials::new(&config.access_key, &config.secret_key, None, None, "tcms");

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true); // Required for MinIO

        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let storage = Self {
            client: Client::from_conf(s3_config_builder.build()),
            bucket: config.bucket.clone(),
        };

        storage.ensure_bucket_exists().await?;

        info!("S3 artifact storage initialized: bucket={}", config.bucket);

        Ok(storage)
    }

    async fn ensure_bucket_exists(&self) -> AppResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_error = e.into_service_error();
                if !service_error.is_not_found() {
                    return Err(AppError::Storage(format!(
                        "Failed to access bucket '{}': {}",
                        self.bucket, service_error
                    )));
                }

                info!("Creating S3 bucket '{}'", self.bucket);
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map_err(|e| AppError::Storage(format!("Failed to create bucket: {}", e)))?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ArtifactStorage for S3Storage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> AppResult<()> {
        let body = aws_sdk_s3::primitives::ByteStream::from(data);
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body);

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to upload artifact to S3: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete artifact from S3: {}", e)))?;

        Ok(())
    }
}

/// Artifacts stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key below the root, refusing anything that could escape it.
    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(AppError::Storage(format!("Invalid storage key: {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStorage for LocalStorage {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: Option<&str>) -> AppResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write {}: {}", path.display(), e)))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
