use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::path::{Path, PathBuf};

use super::{BlobStore, StorageError, StorageResult};
use crate::config::Config;

/// S3 (or S3-compatible) object store
#[derive(Clone)]
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the storage section of the configuration
    pub async fn from_config(config: &Config) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(config.aws_region())
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if let Some(endpoint) = &config.storage.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::new(S3Client::from_conf(builder.build()), &config.storage.bucket)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if not_found {
                    Ok(false)
                } else {
                    Err(StorageError::upload_failed(format!(
                        "Failed to check s3://{}/{}: {}",
                        self.bucket, key, e
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<()> {
        if self.exists(key).await? {
            return Err(StorageError::AlreadyExists(self.describe(key)));
        }

        tracing::debug!("Uploading {} to {}", path.display(), self.describe(key));

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("Cannot read {}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        tracing::debug!("Deleting {}", self.describe(key));

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }

    fn describe(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

/// Object store on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StorageError::upload_failed(format!("Invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, key: &str, path: &Path, _content_type: &str) -> StorageResult<()> {
        let target = self.object_path(key)?;
        if target.exists() {
            return Err(StorageError::AlreadyExists(self.describe(key)));
        }

        if let Some(parent) = target.parent() {
            fs_err::create_dir_all(parent)?;
        }

        tracing::debug!("Copying {} to {}", path.display(), target.display());
        fs_err::copy(path, &target)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let target = self.object_path(key)?;
        fs_err::remove_file(&target).map_err(|e| StorageError::delete_failed(e.to_string()))
    }

    fn describe(&self, key: &str) -> String {
        self.root.join(key).display().to_string()
    }
}
