//! Caller-facing operations. Every call returns a `{success, ...}` envelope instead of an error,
//! so the CLI (or any other front end) can print the result as-is.

use futures_util::future::try_join;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::{CancelSignal, Pipeline, ProcessOutcome, SourceReference, Stage};
use crate::storage::{ProcessingLog, RecordQuery, RecordStore, StorageError, Tag, VideoRecord};
use crate::PipelineError;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ProcessOutcome> for ProcessResponse {
    fn from(outcome: ProcessOutcome) -> Self {
        match outcome {
            ProcessOutcome::Success {
                transcription,
                translation,
                report_path,
                record,
            } => Self {
                success: true,
                youtube_id: Some(record.youtube_id),
                transcription: Some(transcription),
                translation: Some(translation),
                report_path: report_path.map(|p| p.display().to_string()),
                stage: None,
                error_kind: None,
                error: None,
            },
            ProcessOutcome::Failure { stage, error } => Self {
                success: false,
                youtube_id: None,
                transcription: None,
                translation: None,
                report_path: None,
                stage: Some(stage),
                error_kind: Some(error.kind()),
                error: Some(error.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<SourceReference, PipelineError>> for ValidateResponse {
    fn from(result: Result<SourceReference, PipelineError>) -> Self {
        match result {
            Ok(source) => Self {
                success: true,
                youtube_id: Some(source.resolved_id),
                title: Some(source.title),
                duration: Some(source.duration_seconds),
                thumbnail: Some(source.thumbnail_url).filter(|t| !t.is_empty()),
                error: None,
            },
            Err(e) => Self {
                success: false,
                youtube_id: None,
                title: None,
                duration: None,
                thumbnail: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub records: Vec<VideoRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<VideoRecord>,
    pub tags: Vec<String>,
    pub logs: Vec<ProcessingLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordResponse {
    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            record: None,
            tags: Vec::new(),
            logs: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TagsResponse {
    pub success: bool,
    pub tags: Vec<Tag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Envelope for operations with no payload
#[derive(Debug, Clone, Serialize)]
pub struct AckResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<E: std::fmt::Display> From<Result<(), E>> for AckResponse {
    fn from(result: Result<(), E>) -> Self {
        Self {
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        }
    }
}

pub struct Service {
    pipeline: Pipeline,
    records: Arc<dyn RecordStore>,
}

impl Service {
    pub fn new(pipeline: Pipeline) -> Self {
        let records = pipeline.records();
        Self { pipeline, records }
    }

    /// Build the production stack and probe the record store
    pub async fn from_config(config: &Config) -> crate::Result<Self> {
        let service = Self::new(Pipeline::from_config(config).await?);
        service.startup_check().await;
        Ok(service)
    }

    /// Log how many records exist; an unreachable store is reported, not fatal
    pub async fn startup_check(&self) {
        match self.records.count_videos().await {
            Ok(count) => tracing::info!("Record store reachable, {} video(s) on record", count),
            Err(e) => tracing::warn!("Record store check failed: {}", e),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn process(&self, url: &str) -> ProcessResponse {
        self.pipeline.process(url).await.into()
    }

    pub async fn process_with_cancel(&self, url: &str, cancel: CancelSignal) -> ProcessResponse {
        self.pipeline.process_with_cancel(url, cancel).await.into()
    }

    pub async fn validate(&self, url: &str) -> ValidateResponse {
        self.pipeline.validate(url).await.into()
    }

    pub async fn list_records(&self, query: &RecordQuery) -> ListResponse {
        match self.records.list_videos(query).await {
            Ok(records) => ListResponse {
                success: true,
                records,
                error: None,
            },
            Err(e) => ListResponse {
                success: false,
                records: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    /// Full view of one record, keyed by its YouTube id
    pub async fn get_record(&self, youtube_id: &str) -> RecordResponse {
        let record = match self.records.find_by_youtube_id(youtube_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return RecordResponse::failed(format!("No record for {}", youtube_id)),
            Err(e) => return RecordResponse::failed(e),
        };

        match try_join(
            self.records.tags_for_video(record.id),
            self.records.logs_for_video(record.id),
        )
        .await
        {
            Ok((tags, logs)) => RecordResponse {
                success: true,
                record: Some(record),
                tags,
                logs,
                error: None,
            },
            Err(e) => RecordResponse::failed(e),
        }
    }

    pub async fn list_tags(&self) -> TagsResponse {
        match self.records.list_tags().await {
            Ok(tags) => TagsResponse {
                success: true,
                tags,
                error: None,
            },
            Err(e) => TagsResponse {
                success: false,
                tags: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn tag_record(&self, youtube_id: &str, tag: &str) -> AckResponse {
        let result = match self.records.find_by_youtube_id(youtube_id).await {
            Ok(Some(record)) => self.records.tag_video(record.id, tag).await,
            Ok(None) => Err(StorageError::NotFound(format!("record for {}", youtube_id))),
            Err(e) => Err(e),
        };
        result.into()
    }
}
