//! Durable hand-off of a finished run: upload the retained media, insert the record that points
//! at it, then write the human readable report.
//!
//! The upload and the insert are not atomic. The upload yields a [`StagedUpload`] which has to be
//! committed; a commit that fails for any reason other than a duplicate id leaves the blob in
//! place and appends it to the reconciliation journal.

use chrono::{Local, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub mod journal;

pub use journal::{ReconciliationEntry, ReconciliationJournal};

use crate::extractors::media_content_type;
use crate::output::{save_report, Report};
use crate::pipeline::{MediaArtifact, SourceReference};
use crate::storage::{BlobStore, NewVideoRecord, RecordStore, StorageError, VideoRecord};
use crate::transcribe::TranscriptionResult;
use crate::translate::TranslationResult;
use crate::utils::file_name_of;
use crate::PipelineError;

/// A blob that was uploaded but is not yet referenced by any record
#[must_use = "an uploaded blob that is never committed is orphaned"]
#[derive(Debug)]
pub struct StagedUpload {
    key: String,
    location: String,
    youtube_id: String,
}

impl StagedUpload {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Result of a successful hand-off
#[derive(Debug, Clone)]
pub struct Persisted {
    pub record: VideoRecord,
    /// `None` when the report could not be written
    pub report_path: Option<PathBuf>,
}

#[derive(Clone)]
pub struct PersistenceCoordinator {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    key_prefix: String,
    output_dir: PathBuf,
    target_language: String,
    journal: ReconciliationJournal,
}

impl PersistenceCoordinator {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        key_prefix: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        target_language: impl Into<String>,
    ) -> Self {
        let output_dir = output_dir.into();
        Self {
            blobs,
            records,
            key_prefix: key_prefix.into(),
            journal: ReconciliationJournal::in_dir(&output_dir),
            output_dir,
            target_language: target_language.into(),
        }
    }

    pub fn journal(&self) -> &ReconciliationJournal {
        &self.journal
    }

    /// Upload, insert, then write the report
    pub async fn persist(
        &self,
        source: &SourceReference,
        artifact: &MediaArtifact,
        transcription: &TranscriptionResult,
        translation: &TranslationResult,
    ) -> Result<Persisted, PipelineError> {
        // Both texts must exist before anything durable happens
        if transcription.text.trim().is_empty() || translation.text.trim().is_empty() {
            return Err(PipelineError::Persistence(
                "refusing to persist an empty transcription or translation".to_string(),
            ));
        }

        let staged = self.stage_upload(&source.resolved_id, artifact).await?;

        let record = self
            .commit(
                staged,
                NewVideoRecord {
                    youtube_url: source.url.clone(),
                    youtube_id: source.resolved_id.clone(),
                    video_storage_path: String::new(),
                    transcription: transcription.text.clone(),
                    translation: translation.text.clone(),
                },
            )
            .await?;

        let report_path = self.write_report(&record);

        Ok(Persisted {
            record,
            report_path,
        })
    }

    /// Upload the retained artifact under a key unique to this run
    pub async fn stage_upload(
        &self,
        youtube_id: &str,
        artifact: &MediaArtifact,
    ) -> Result<StagedUpload, PipelineError> {
        let path = artifact.retained_path();
        let file_name = file_name_of(path).ok_or_else(|| {
            PipelineError::Persistence(format!("Artifact has no file name: {}", path.display()))
        })?;

        let run_id = Uuid::new_v4().simple().to_string();
        let key = blob_key(&self.key_prefix, youtube_id, &run_id[..12], &file_name);
        let location = self.blobs.describe(&key);

        tracing::info!("Uploading {} to {}", path.display(), location);

        self.blobs
            .upload(&key, path, media_content_type(path))
            .await
            .map_err(|e| PipelineError::Persistence(format!("Upload to {} failed: {}", location, e)))?;

        Ok(StagedUpload {
            key,
            location,
            youtube_id: youtube_id.to_string(),
        })
    }

    /// Insert the record that references a staged upload
    pub async fn commit(
        &self,
        staged: StagedUpload,
        mut record: NewVideoRecord,
    ) -> Result<VideoRecord, PipelineError> {
        record.video_storage_path = staged.key.clone();

        match self.records.insert_video(&record).await {
            Ok(inserted) => {
                tracing::info!("Recorded {} as #{}", inserted.youtube_id, inserted.id);
                Ok(inserted)
            }
            Err(StorageError::UniqueViolation(_)) => {
                // Another run won the race; its record points at its own blob
                if let Err(e) = self.blobs.delete(&staged.key).await {
                    tracing::warn!("Could not remove duplicate upload {}: {}", staged.location, e);
                }
                Err(PipelineError::DuplicateRecord {
                    youtube_id: staged.youtube_id,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(
                    youtube_id = %staged.youtube_id,
                    blob = %staged.location,
                    journal = %self.journal.path().display(),
                    "Record insert failed after upload, blob and intended record need reconciliation: {}",
                    reason
                );

                let entry = ReconciliationEntry {
                    occurred_at: Utc::now(),
                    youtube_id: staged.youtube_id.clone(),
                    youtube_url: record.youtube_url.clone(),
                    blob_path: staged.key.clone(),
                    blob_location: staged.location.clone(),
                    transcription: record.transcription,
                    translation: record.translation,
                    reason: reason.clone(),
                };
                if let Err(journal_err) = self.journal.append(&entry) {
                    tracing::error!(
                        "Could not append to {}: {:#}",
                        self.journal.path().display(),
                        journal_err
                    );
                }

                Err(PipelineError::PartialPersistence {
                    blob_path: staged.key,
                    youtube_id: staged.youtube_id,
                    reason,
                })
            }
        }
    }

    fn write_report(&self, record: &VideoRecord) -> Option<PathBuf> {
        let report = Report {
            youtube_id: &record.youtube_id,
            source_url: &record.youtube_url,
            transcription: &record.transcription,
            translation: &record.translation,
            target_language: &self.target_language,
            processed_at: record.created_at.with_timezone(&Local),
        };

        match save_report(&report, &self.output_dir) {
            Ok(path) => {
                tracing::info!("Report saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Could not write report for {}: {:#}", record.youtube_id, e);
                None
            }
        }
    }
}

/// `<prefix><youtube_id>/<run_id>/<file_name>`
pub fn blob_key(prefix: &str, youtube_id: &str, run_id: &str, file_name: &str) -> String {
    let mut key = prefix.trim_start_matches('/').to_string();
    if !key.is_empty() && !key.ends_with('/') {
        key.push('/');
    }
    format!("{}{}/{}/{}", key, youtube_id, run_id, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::AudioFormat;
    use crate::storage::{MockBlobStore, MockRecordStore};

    struct Fixture {
        _dir: tempfile::TempDir,
        output_dir: PathBuf,
        artifact: MediaArtifact,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("abc.mp3");
        let video = dir.path().join("abc.mp4");
        fs_err::write(&audio, b"audio").unwrap();
        fs_err::write(&video, b"video").unwrap();

        Fixture {
            output_dir: dir.path().join("outputs"),
            artifact: MediaArtifact {
                id: "abc".into(),
                container_path: Some(video),
                audio_path: audio,
                format: AudioFormat::Mp3,
            },
            _dir: dir,
        }
    }

    fn source() -> SourceReference {
        SourceReference {
            url: "https://www.youtube.com/watch?v=abc".into(),
            resolved_id: "abc".into(),
            title: "Clip".into(),
            duration_seconds: 60,
            thumbnail_url: String::new(),
        }
    }

    fn texts() -> (TranscriptionResult, TranslationResult) {
        (
            TranscriptionResult {
                text: "こんにちは".into(),
            },
            TranslationResult {
                text: "Hello".into(),
            },
        )
    }

    fn describing_blobs() -> MockBlobStore {
        let mut blobs = MockBlobStore::new();
        blobs.expect_describe().returning(|key| format!("mock://{}", key));
        blobs
    }

    fn stored(record: &NewVideoRecord) -> VideoRecord {
        VideoRecord {
            id: 1,
            youtube_url: record.youtube_url.clone(),
            youtube_id: record.youtube_id.clone(),
            video_storage_path: record.video_storage_path.clone(),
            transcription: record.transcription.clone(),
            translation: record.translation.clone(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn keys_are_namespaced_per_run() {
        assert_eq!(blob_key("videos/", "abc", "r1", "abc.mp4"), "videos/abc/r1/abc.mp4");
        assert_eq!(blob_key("videos", "abc", "r1", "abc.mp4"), "videos/abc/r1/abc.mp4");
        assert_eq!(blob_key("", "abc", "r1", "abc.mp4"), "abc/r1/abc.mp4");
    }

    #[tokio::test]
    async fn uploads_then_inserts_then_reports() {
        let fx = fixture();
        let (transcription, translation) = texts();

        let mut blobs = describing_blobs();
        blobs
            .expect_upload()
            .withf(|key, _, content_type| key.starts_with("videos/abc/") && key.ends_with("/abc.mp4") && content_type == "video/mp4")
            .times(1)
            .returning(|_, _, _| Ok(()));
        blobs.expect_delete().times(0);

        let mut records = MockRecordStore::new();
        records
            .expect_insert_video()
            .withf(|r| r.youtube_id == "abc" && r.video_storage_path.starts_with("videos/abc/"))
            .times(1)
            .returning(|r| Ok(stored(r)));

        let coordinator = PersistenceCoordinator::new(
            Arc::new(blobs),
            Arc::new(records),
            "videos/",
            &fx.output_dir,
            "English",
        );

        let persisted = coordinator
            .persist(&source(), &fx.artifact, &transcription, &translation)
            .await
            .unwrap();

        assert_eq!(persisted.record.translation, "Hello");
        let report = persisted.report_path.expect("report written");
        assert!(fs_err::read_to_string(report).unwrap().contains("## Translation (English)\nHello"));
    }

    #[tokio::test]
    async fn unwritable_report_still_persists() {
        let fx = fixture();
        let (transcription, translation) = texts();
        // A regular file where the output directory should be
        fs_err::write(&fx.output_dir, b"not a directory").unwrap();

        let mut blobs = describing_blobs();
        blobs.expect_upload().times(1).returning(|_, _, _| Ok(()));
        blobs.expect_delete().times(0);

        let mut records = MockRecordStore::new();
        records.expect_insert_video().times(1).returning(|r| Ok(stored(r)));

        let coordinator = PersistenceCoordinator::new(Arc::new(blobs), Arc::new(records), "videos/", &fx.output_dir, "English");
        let persisted = coordinator
            .persist(&source(), &fx.artifact, &transcription, &translation)
            .await
            .unwrap();

        assert_eq!(persisted.report_path, None);
        assert_eq!(persisted.record.youtube_id, "abc");
        assert_eq!(persisted.record.transcription, "こんにちは");
    }

    #[tokio::test]
    async fn failed_upload_never_inserts() {
        let fx = fixture();
        let (transcription, translation) = texts();

        let mut blobs = describing_blobs();
        blobs
            .expect_upload()
            .returning(|_, _, _| Err(StorageError::upload_failed("connection reset")));

        let mut records = MockRecordStore::new();
        records.expect_insert_video().times(0);

        let coordinator = PersistenceCoordinator::new(Arc::new(blobs), Arc::new(records), "videos/", &fx.output_dir, "English");
        let err = coordinator
            .persist(&source(), &fx.artifact, &transcription, &translation)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Persistence(_)));
        assert!(coordinator.journal().entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_failure_is_partial_and_journaled() {
        let fx = fixture();
        let (transcription, translation) = texts();

        let mut blobs = describing_blobs();
        blobs.expect_upload().returning(|_, _, _| Ok(()));
        blobs.expect_delete().times(0);

        let mut records = MockRecordStore::new();
        records
            .expect_insert_video()
            .returning(|_| Err(StorageError::Io(std::io::Error::other("disk I/O error"))));

        let coordinator = PersistenceCoordinator::new(Arc::new(blobs), Arc::new(records), "videos/", &fx.output_dir, "English");
        let err = coordinator
            .persist(&source(), &fx.artifact, &transcription, &translation)
            .await
            .unwrap_err();

        let PipelineError::PartialPersistence { blob_path, youtube_id, .. } = err else {
            panic!("expected partial persistence, got {err:?}");
        };
        assert_eq!(youtube_id, "abc");

        let entries = coordinator.journal().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].blob_path, blob_path);
        assert_eq!(entries[0].blob_location, format!("mock://{}", blob_path));
        assert_eq!(entries[0].transcription, "こんにちは");
        assert_eq!(entries[0].translation, "Hello");
    }

    #[tokio::test]
    async fn unique_violation_removes_own_upload() {
        let fx = fixture();
        let (transcription, translation) = texts();

        let mut blobs = describing_blobs();
        blobs.expect_upload().returning(|_, _, _| Ok(()));
        blobs
            .expect_delete()
            .withf(|key| key.starts_with("videos/abc/"))
            .times(1)
            .returning(|_| Ok(()));

        let mut records = MockRecordStore::new();
        records
            .expect_insert_video()
            .returning(|_| Err(StorageError::UniqueViolation("youtube_id abc".into())));

        let coordinator = PersistenceCoordinator::new(Arc::new(blobs), Arc::new(records), "videos/", &fx.output_dir, "English");
        let err = coordinator
            .persist(&source(), &fx.artifact, &transcription, &translation)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::DuplicateRecord { ref youtube_id } if youtube_id == "abc"));
        assert!(coordinator.journal().entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_texts_touch_nothing() {
        let fx = fixture();

        let mut blobs = MockBlobStore::new();
        blobs.expect_upload().times(0);
        let mut records = MockRecordStore::new();
        records.expect_insert_video().times(0);

        let coordinator = PersistenceCoordinator::new(Arc::new(blobs), Arc::new(records), "videos/", &fx.output_dir, "English");
        let err = coordinator
            .persist(
                &source(),
                &fx.artifact,
                &TranscriptionResult { text: "  ".into() },
                &TranslationResult { text: "Hello".into() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
    }

    #[tokio::test]
    async fn every_run_gets_its_own_key() {
        let fx = fixture();

        let mut blobs = describing_blobs();
        blobs.expect_upload().times(2).returning(|_, _, _| Ok(()));

        let mut records = MockRecordStore::new();
        records.expect_insert_video().returning(|r| Ok(stored(r)));

        let coordinator = PersistenceCoordinator::new(Arc::new(blobs), Arc::new(records), "p", &fx.output_dir, "English");
        let first = coordinator.stage_upload("abc", &fx.artifact).await.unwrap();
        let staged = coordinator.stage_upload("abc", &fx.artifact).await.unwrap();
        let key = staged.key().to_string();
        assert_ne!(first.key(), key);
        drop(first);

        let record = coordinator
            .commit(
                staged,
                NewVideoRecord {
                    youtube_url: "https://youtu.be/abc".into(),
                    youtube_id: "abc".into(),
                    video_storage_path: String::new(),
                    transcription: "t".into(),
                    translation: "u".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(record.video_storage_path, key);
        assert!(key.starts_with("p/abc/"));
    }
}
