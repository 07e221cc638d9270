//! Video Scribe - transcribe and translate short videos from a public URL
//!
//! This library validates a video URL against a duration ceiling, downloads its audio with
//! yt-dlp, transcribes it (local Whisper or AWS Transcribe), translates the transcript through
//! an OpenAI-compatible chat endpoint, and records the result next to the uploaded media.

pub mod api;
pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod persist;
pub mod pipeline;
pub mod storage;
pub mod transcribe;
pub mod translate;
pub mod utils;

pub use api::Service;
pub use cli::{Cli, Commands};
pub use config::Config;
pub use extractors::{MediaSource, SourceMetadata};
pub use pipeline::{Pipeline, PipelineDeps, PipelineSettings, ProcessOutcome, Stage};
pub use storage::{BlobStore, RecordStore, VideoRecord};
pub use transcribe::{TranscriptionEngine, TranscriptionResult};
pub use translate::{TranslationResult, Translator};

/// Result type used by the glue code (config, engines, CLI)
pub type Result<T> = anyhow::Result<T>;

/// Errors a pipeline stage can fail with
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Video duration {duration}s exceeds the {limit}s limit")]
    DurationExceeded { duration: u64, limit: u64 },

    #[error("Media acquisition failed: {0}")]
    Acquisition(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Blob {blob_path} was uploaded but the record for {youtube_id} was not inserted: {reason}")]
    PartialPersistence {
        blob_path: String,
        youtube_id: String,
        reason: String,
    },

    #[error("Video {youtube_id} has already been processed")]
    DuplicateRecord { youtube_id: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

/// How callers should treat a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Input was rejected before any expensive work; resubmit a different URL
    Rejected,
    /// A stage failed; only resubmission can recover
    StageFailure,
    /// Durable state may be inconsistent and needs manual reconciliation
    IntegrityRisk,
    /// The video is already on record
    AlreadyProcessed,
    /// The caller aborted the run
    Cancelled,
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidSource(_) | Self::DurationExceeded { .. } => ErrorClass::Rejected,
            Self::Acquisition(_) | Self::Transcription(_) | Self::Translation(_) => {
                ErrorClass::StageFailure
            }
            Self::Persistence(_) | Self::PartialPersistence { .. } => ErrorClass::IntegrityRisk,
            Self::DuplicateRecord { .. } => ErrorClass::AlreadyProcessed,
            Self::Cancelled(_) => ErrorClass::Cancelled,
        }
    }

    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSource(_) => "invalid_source",
            Self::DurationExceeded { .. } => "duration_exceeded",
            Self::Acquisition(_) => "acquisition",
            Self::Transcription(_) => "transcription",
            Self::Translation(_) => "translation",
            Self::Persistence(_) => "persistence",
            Self::PartialPersistence { .. } => "partial_persistence",
            Self::DuplicateRecord { .. } => "duplicate_record",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_error_names_the_ceiling() {
        let err = PipelineError::DurationExceeded {
            duration: 200,
            limit: 180,
        };
        assert_eq!(err.to_string(), "Video duration 200s exceeds the 180s limit");
        assert_eq!(err.class(), ErrorClass::Rejected);
    }

    #[test]
    fn duplicate_is_not_a_fault() {
        let err = PipelineError::DuplicateRecord {
            youtube_id: "abc".into(),
        };
        assert_eq!(err.class(), ErrorClass::AlreadyProcessed);
        assert_eq!(err.kind(), "duplicate_record");
    }

    #[test]
    fn partial_persistence_message_carries_reconcile_details() {
        let err = PipelineError::PartialPersistence {
            blob_path: "videos/abc/run/abc.mp4".into(),
            youtube_id: "abc".into(),
            reason: "disk I/O error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("videos/abc/run/abc.mp4"));
        assert!(msg.contains("abc"));
        assert_eq!(err.class(), ErrorClass::IntegrityRisk);
    }
}
