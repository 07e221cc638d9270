use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_transcribe::types::{Media, MediaFormat};
use aws_sdk_transcribe::Client as TranscribeClient;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use super::processor::TranscriptionProcessor;
use super::TranscriptionEngine;
use crate::config::Config;
use crate::extractors::AudioFormat;

/// Remote transcription through AWS Transcribe
///
/// The audio is staged in S3 for the duration of the job and removed afterwards.
pub struct AwsTranscribeEngine {
    s3_client: S3Client,
    transcribe_client: TranscribeClient,
    bucket: String,
    key_prefix: String,
    language: Option<String>,
    poll_interval: Duration,
}

impl AwsTranscribeEngine {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let bucket = config
            .transcription
            .aws_bucket
            .clone()
            .context("transcription.aws_bucket is not configured")?;

        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(config.aws_region())
            .load()
            .await;

        Ok(Self {
            s3_client: S3Client::new(&aws_config),
            transcribe_client: TranscribeClient::new(&aws_config),
            bucket,
            key_prefix: config.transcription.aws_key_prefix.clone().unwrap_or_default(),
            language: config.transcription.language.clone(),
            poll_interval: Duration::from_secs(5),
        })
    }

    /// Upload audio file to S3
    async fn upload_to_s3(&self, audio_path: &Path, format: AudioFormat) -> Result<String> {
        let key = format!(
            "{}audio_{}_{}.{}",
            self.key_prefix,
            Uuid::new_v4(),
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            format.as_str()
        );

        tracing::info!("Staging audio in S3: s3://{}/{}", self.bucket, key);

        let body = ByteStream::from_path(audio_path)
            .await
            .with_context(|| format!("Failed to read {}", audio_path.display()))?;

        self.s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type(format.mime_type())
            .send()
            .await
            .context("Failed to upload audio to S3")?;

        Ok(key)
    }

    /// Start AWS Transcribe job
    async fn start_transcription_job(&self, s3_key: &str, format: AudioFormat) -> Result<String> {
        let job_name = format!("video_scribe_{}", Uuid::new_v4());
        let media_uri = format!("s3://{}/{}", self.bucket, s3_key);

        tracing::info!("Starting transcription job: {}", job_name);

        let media_format = match format {
            AudioFormat::Mp3 => MediaFormat::Mp3,
            AudioFormat::M4a => MediaFormat::Mp4,
            AudioFormat::Wav => MediaFormat::Wav,
            AudioFormat::Flac => MediaFormat::Flac,
            AudioFormat::Ogg => MediaFormat::Ogg,
            AudioFormat::Webm => MediaFormat::Webm,
        };

        let media = Media::builder().media_file_uri(media_uri).build();

        let mut job_builder = self
            .transcribe_client
            .start_transcription_job()
            .transcription_job_name(&job_name)
            .media_format(media_format)
            .media(media);

        match self.language.as_deref() {
            Some(lang) => {
                tracing::debug!("Using configured language: {}", lang);
                job_builder = job_builder.language_code(lang.into());
            }
            None => {
                job_builder = job_builder.identify_language(true);
            }
        }

        job_builder
            .send()
            .await
            .context("Failed to start transcription job")?;

        Ok(job_name)
    }

    /// Removes the staged object once the guard is run or dropped
    fn staged_object(&self, s3_key: &str) -> CleanupOnDrop {
        let client = self.s3_client.clone();
        let bucket = self.bucket.clone();
        let key = s3_key.to_string();

        CleanupOnDrop::new(async move {
            tracing::debug!("Cleaning up S3 object: {}", key);

            if let Err(e) = client.delete_object().bucket(&bucket).key(&key).send().await {
                tracing::warn!("Failed to clean up staged audio s3://{}/{}: {}", bucket, key, e);
            }
        })
    }
}

/// Runs a cleanup future exactly once: awaited through [`CleanupOnDrop::run`], or spawned onto
/// the runtime when the owner is dropped first (stage timeout, cancellation)
struct CleanupOnDrop {
    cleanup: Option<BoxFuture<'static, ()>>,
}

impl CleanupOnDrop {
    fn new(cleanup: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            cleanup: Some(Box::pin(cleanup)),
        }
    }

    async fn run(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.await;
        }
    }
}

impl Drop for CleanupOnDrop {
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(cleanup);
            }
            Err(_) => tracing::warn!("No runtime left to clean up staged audio"),
        }
    }
}

#[async_trait]
impl TranscriptionEngine for AwsTranscribeEngine {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let format = audio_path
            .extension()
            .and_then(|ext| AudioFormat::from_extension(&ext.to_string_lossy()))
            .with_context(|| format!("Unsupported audio format: {}", audio_path.display()))?;

        let s3_key = self.upload_to_s3(audio_path, format).await?;
        let staged = self.staged_object(&s3_key);

        let result = async {
            let job_id = self.start_transcription_job(&s3_key, format).await?;
            TranscriptionProcessor::new(self.transcribe_client.clone(), job_id, self.poll_interval)
                .wait_for_completion()
                .await
        }
        .await;

        // The staged object goes away whether or not the job succeeded
        staged.run().await;

        result
    }

    fn engine_name(&self) -> &'static str {
        "aws-transcribe"
    }
}
