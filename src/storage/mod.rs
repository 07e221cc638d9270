//! Durable storage: the object store holding uploaded media and the relational store holding
//! video records, tags and processing logs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub mod blob;
pub mod records;

pub use blob::{LocalBlobStore, S3BlobStore};
pub use records::SqliteRecordStore;

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn delete_failed(msg: impl Into<String>) -> Self {
        Self::DeleteFailed(msg.into())
    }
}

/// A stored video, the unit of record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VideoRecord {
    pub id: i64,
    pub youtube_url: String,
    pub youtube_id: String,
    #[sqlx(rename = "video_path")]
    #[serde(rename = "video_path")]
    pub video_storage_path: String,
    pub transcription: String,
    pub translation: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for a record about to be inserted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewVideoRecord {
    pub youtube_url: String,
    pub youtube_id: String,
    pub video_storage_path: String,
    pub transcription: String,
    pub translation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// One stage of a run, attached to the record it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessingLog {
    pub id: i64,
    pub video_id: i64,
    pub stage: String,
    pub status: String,
    pub message: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProcessingLog {
    pub video_id: i64,
    pub stage: String,
    pub status: String,
    pub message: Option<String>,
    pub duration_ms: Option<i64>,
}

/// Filters for listing records; newest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub youtube_id: Option<String>,
    pub tag: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Object storage for uploaded media
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file under `key`; existing objects are never overwritten
    async fn upload(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<()>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Human readable location, used in logs
    fn describe(&self, key: &str) -> String;
}

/// Relational store for video records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record; a second record for the same `youtube_id` is a `UniqueViolation`
    async fn insert_video(&self, record: &NewVideoRecord) -> StorageResult<VideoRecord>;

    async fn find_by_youtube_id(&self, youtube_id: &str) -> StorageResult<Option<VideoRecord>>;

    async fn list_videos(&self, query: &RecordQuery) -> StorageResult<Vec<VideoRecord>>;

    async fn count_videos(&self) -> StorageResult<i64>;

    async fn tags_for_video(&self, video_id: i64) -> StorageResult<Vec<String>>;

    async fn list_tags(&self) -> StorageResult<Vec<Tag>>;

    async fn tag_video(&self, video_id: i64, name: &str) -> StorageResult<()>;

    async fn append_log(&self, entry: &NewProcessingLog) -> StorageResult<()>;

    async fn logs_for_video(&self, video_id: i64) -> StorageResult<Vec<ProcessingLog>>;
}
