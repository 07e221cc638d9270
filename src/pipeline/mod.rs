//! The processing pipeline: validate, acquire, transcribe, translate, persist, clean up.
//!
//! Each invocation is independent and runs its stages strictly in order. Failures carry the
//! stage they happened in; cleanup of scratch files runs whenever media was acquired.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

pub mod acquirer;
pub mod cancel;
pub mod validator;

pub use acquirer::{MediaAcquirer, MediaArtifact, ScratchClaim};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use validator::{MetadataValidator, SourceReference};

use crate::config::{Config, StorageBackend, TranscriptionBackend};
use crate::extractors::youtube::YtDlpSource;
use crate::extractors::MediaSource;
use crate::persist::{Persisted, PersistenceCoordinator};
use crate::storage::{
    BlobStore, LocalBlobStore, NewProcessingLog, RecordStore, S3BlobStore, SqliteRecordStore,
    VideoRecord,
};
use crate::transcribe::{AwsTranscribeEngine, TranscriptionAdapter, TranscriptionEngine, WhisperCliEngine};
use crate::translate::{OpenAiTranslator, TranslationAdapter, Translator};
use crate::{ErrorClass, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validating,
    Acquiring,
    Transcribing,
    Translating,
    Persisting,
    Cleaning,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::Acquiring => "acquiring",
            Stage::Transcribing => "transcribing",
            Stage::Translating => "translating",
            Stage::Persisting => "persisting",
            Stage::Cleaning => "cleaning",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one invocation produced
#[derive(Debug)]
pub enum ProcessOutcome {
    Success {
        transcription: String,
        translation: String,
        report_path: Option<PathBuf>,
        record: VideoRecord,
    },
    Failure {
        stage: Stage,
        error: PipelineError,
    },
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_duration_seconds: u64,
    pub scratch_dir: PathBuf,
    pub output_dir: PathBuf,
    pub keep_video: bool,
    pub stage_timeout: Option<Duration>,
    pub key_prefix: String,
    pub source_language: String,
    pub target_language: String,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_duration_seconds: config.source.max_duration_seconds,
            scratch_dir: config.app.scratch_dir.clone(),
            output_dir: config.app.output_dir.clone(),
            keep_video: config.app.keep_video,
            stage_timeout: config.app.stage_timeout_seconds.map(Duration::from_secs),
            key_prefix: config.storage.key_prefix.clone(),
            source_language: config.translation.source_language.clone(),
            target_language: config.translation.target_language.clone(),
        }
    }
}

/// External capabilities the pipeline runs against
#[derive(Clone)]
pub struct PipelineDeps {
    pub source: Arc<dyn MediaSource>,
    pub engine: Arc<dyn TranscriptionEngine>,
    pub translator: Arc<dyn Translator>,
    pub blobs: Arc<dyn BlobStore>,
    pub records: Arc<dyn RecordStore>,
}

impl PipelineDeps {
    /// Build the production stack described by `config`
    pub async fn from_config(config: &Config) -> crate::Result<Self> {
        let source: Arc<dyn MediaSource> = Arc::new(YtDlpSource::new(&config.source.yt_dlp_path));

        let engine: Arc<dyn TranscriptionEngine> = match config.transcription.engine {
            TranscriptionBackend::Whisper => Arc::new(
                WhisperCliEngine::new(
                    &config.transcription.whisper_path,
                    &config.transcription.whisper_model,
                )
                .with_language(config.transcription.language.clone()),
            ),
            TranscriptionBackend::Aws => Arc::new(AwsTranscribeEngine::from_config(config).await?),
        };

        let translator: Arc<dyn Translator> = Arc::new(
            OpenAiTranslator::from_config(&config.translation)
                .context("Failed to build the translation client")?,
        );

        let blobs: Arc<dyn BlobStore> = match config.storage.backend {
            StorageBackend::S3 => Arc::new(S3BlobStore::from_config(config).await),
            StorageBackend::Local => Arc::new(LocalBlobStore::new(&config.storage.local_root)),
        };

        let records: Arc<dyn RecordStore> = Arc::new(
            SqliteRecordStore::connect(&config.database.url, config.database.max_connections)
                .await
                .with_context(|| format!("Failed to open record store {}", config.database.url))?,
        );

        Ok(Self {
            source,
            engine,
            translator,
            blobs,
            records,
        })
    }
}

#[derive(Debug, Default)]
struct StageTimings(Vec<(Stage, Duration)>);

impl StageTimings {
    fn record(&mut self, stage: Stage, started: Instant) {
        let elapsed = started.elapsed();
        tracing::debug!("{} took {:?}", stage, elapsed);
        self.0.push((stage, elapsed));
    }

    fn total(&self) -> Duration {
        self.0.iter().map(|(_, d)| *d).sum()
    }
}

#[derive(Clone)]
pub struct Pipeline {
    validator: MetadataValidator,
    acquirer: MediaAcquirer,
    transcriber: TranscriptionAdapter,
    translator: TranslationAdapter,
    persistence: PersistenceCoordinator,
    records: Arc<dyn RecordStore>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, settings: PipelineSettings) -> Self {
        Self {
            validator: MetadataValidator::new(Arc::clone(&deps.source), settings.max_duration_seconds),
            acquirer: MediaAcquirer::new(deps.source, &settings.scratch_dir, settings.keep_video),
            transcriber: TranscriptionAdapter::new(deps.engine),
            translator: TranslationAdapter::new(deps.translator),
            persistence: PersistenceCoordinator::new(
                deps.blobs,
                Arc::clone(&deps.records),
                &settings.key_prefix,
                &settings.output_dir,
                &settings.target_language,
            ),
            records: deps.records,
            settings,
        }
    }

    pub async fn from_config(config: &Config) -> crate::Result<Self> {
        let deps = PipelineDeps::from_config(config).await?;
        Ok(Self::new(deps, PipelineSettings::from_config(config)))
    }

    pub fn records(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.records)
    }

    /// Admission check only; nothing is downloaded or stored
    pub async fn validate(&self, url: &str) -> Result<SourceReference, PipelineError> {
        self.validator.validate(url).await
    }

    pub async fn process(&self, url: &str) -> ProcessOutcome {
        self.process_with_cancel(url, CancelSignal::never()).await
    }

    pub async fn process_with_cancel(&self, url: &str, cancel: CancelSignal) -> ProcessOutcome {
        let span = tracing::info_span!("process", url = %url);
        self.run(url, &cancel).instrument(span).await
    }

    async fn run(&self, url: &str, cancel: &CancelSignal) -> ProcessOutcome {
        let mut timings = StageTimings::default();

        let started = Instant::now();
        let source = match self.guarded(Stage::Validating, cancel, self.admit(url)).await {
            Ok(source) => source,
            Err(error) => return self.failed(Stage::Validating, error),
        };
        timings.record(Stage::Validating, started);

        let claim = match self.acquirer.claim(&source.resolved_id) {
            Ok(claim) => claim,
            Err(error) => return self.failed(Stage::Acquiring, error),
        };

        let started = Instant::now();
        let artifact = match self
            .guarded(Stage::Acquiring, cancel, self.acquirer.acquire(&source, &claim))
            .await
        {
            Ok(artifact) => artifact,
            Err(error) => {
                claim.remove_transient(None).await;
                return self.failed(Stage::Acquiring, error);
            }
        };
        timings.record(Stage::Acquiring, started);

        let result = self.complete(&source, &artifact, cancel, &mut timings).await;

        // The kept video survives both success and failure
        let started = Instant::now();
        let removed = claim.remove_transient(artifact.container_path.as_deref()).await;
        tracing::debug!("Removed {} scratch file(s)", removed.len());
        timings.record(Stage::Cleaning, started);
        drop(claim);

        match result {
            Ok(persisted) => {
                self.record_timings(persisted.record.id, &timings).await;
                tracing::info!(
                    "Processed {} in {:.1}s",
                    persisted.record.youtube_id,
                    timings.total().as_secs_f64()
                );
                ProcessOutcome::Success {
                    transcription: persisted.record.transcription.clone(),
                    translation: persisted.record.translation.clone(),
                    report_path: persisted.report_path,
                    record: persisted.record,
                }
            }
            Err((stage, error)) => self.failed(stage, error),
        }
    }

    /// Validation plus the cheap duplicate check, before anything is downloaded
    async fn admit(&self, url: &str) -> Result<SourceReference, PipelineError> {
        let source = self.validator.validate(url).await?;

        match self.records.find_by_youtube_id(&source.resolved_id).await {
            Ok(None) => Ok(source),
            Ok(Some(_)) => Err(PipelineError::DuplicateRecord {
                youtube_id: source.resolved_id,
            }),
            Err(e) => Err(PipelineError::Persistence(format!(
                "Could not check for an existing record: {}",
                e
            ))),
        }
    }

    async fn complete(
        &self,
        source: &SourceReference,
        artifact: &MediaArtifact,
        cancel: &CancelSignal,
        timings: &mut StageTimings,
    ) -> Result<Persisted, (Stage, PipelineError)> {
        let started = Instant::now();
        let transcription = self
            .guarded(
                Stage::Transcribing,
                cancel,
                self.transcriber.transcribe(&artifact.audio_path),
            )
            .await
            .map_err(|e| (Stage::Transcribing, e))?;
        timings.record(Stage::Transcribing, started);

        let started = Instant::now();
        let translation = self
            .guarded(
                Stage::Translating,
                cancel,
                self.translator.translate(
                    &transcription.text,
                    &self.settings.source_language,
                    &self.settings.target_language,
                ),
            )
            .await
            .map_err(|e| (Stage::Translating, e))?;
        timings.record(Stage::Translating, started);

        // Once the upload starts the hand-off runs to completion
        if cancel.is_cancelled() {
            return Err((
                Stage::Persisting,
                PipelineError::Cancelled("cancelled before persisting".to_string()),
            ));
        }

        let started = Instant::now();
        let persisted = self
            .persistence
            .persist(source, artifact, &transcription, &translation)
            .await
            .map_err(|e| (Stage::Persisting, e))?;
        timings.record(Stage::Persisting, started);

        Ok(persisted)
    }

    /// Run one stage bounded by the stage timeout and the cancellation signal
    async fn guarded<T, F>(&self, stage: Stage, cancel: &CancelSignal, work: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(format!("cancelled before {}", stage)));
        }

        let limit = self.settings.stage_timeout;
        let bounded = async move {
            match limit {
                Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
                    Err(PipelineError::Cancelled(format!(
                        "{} exceeded {}s",
                        stage,
                        limit.as_secs()
                    )))
                }),
                None => work.await,
            }
        };

        let mut cancel = cancel.clone();
        tokio::select! {
            result = bounded => result,
            _ = cancel.cancelled() => Err(PipelineError::Cancelled(format!("cancelled during {}", stage))),
        }
    }

    async fn record_timings(&self, video_id: i64, timings: &StageTimings) {
        let entries = timings
            .0
            .iter()
            .map(|(stage, elapsed)| (*stage, *elapsed))
            .chain(std::iter::once((Stage::Done, timings.total())));

        for (stage, elapsed) in entries {
            let entry = NewProcessingLog {
                video_id,
                stage: stage.to_string(),
                status: "completed".to_string(),
                message: None,
                duration_ms: Some(elapsed.as_millis() as i64),
            };
            if let Err(e) = self.records.append_log(&entry).await {
                tracing::warn!("Could not record {} timing for #{}: {}", stage, video_id, e);
            }
        }
    }

    fn failed(&self, stage: Stage, error: PipelineError) -> ProcessOutcome {
        match error.class() {
            ErrorClass::Rejected | ErrorClass::AlreadyProcessed => {
                tracing::info!(stage = %stage, kind = error.kind(), "{}", error)
            }
            ErrorClass::IntegrityRisk => {
                tracing::error!(stage = %stage, kind = error.kind(), "{}", error)
            }
            ErrorClass::StageFailure | ErrorClass::Cancelled => {
                tracing::warn!(stage = %stage, kind = error.kind(), "{}", error)
            }
        }
        ProcessOutcome::Failure { stage, error }
    }
}
