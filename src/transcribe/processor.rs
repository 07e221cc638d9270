use anyhow::{Context, Result};
use aws_sdk_transcribe::types::{TranscriptionJob, TranscriptionJobStatus};
use aws_sdk_transcribe::Client as TranscribeClient;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

/// AWS Transcribe transcript format, reduced to the fields we read
#[derive(Debug, Deserialize)]
struct AwsTranscript {
    results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptResults {
    transcripts: Vec<TranscriptText>,
}

#[derive(Debug, Deserialize)]
struct TranscriptText {
    transcript: String,
}

/// Polls a transcription job until it settles
pub struct TranscriptionProcessor {
    client: TranscribeClient,
    job_id: String,
    base_interval: Duration,
}

impl TranscriptionProcessor {
    pub fn new(client: TranscribeClient, job_id: String, base_interval: Duration) -> Self {
        Self {
            client,
            job_id,
            base_interval,
        }
    }

    /// Wait for transcription job completion and return the transcript text
    pub async fn wait_for_completion(&self) -> Result<String> {
        let start_time = std::time::Instant::now();
        let mut check_count: u32 = 0;

        let job = loop {
            check_count += 1;

            let job = self.get_transcription_job().await?;

            match job.transcription_job_status() {
                Some(TranscriptionJobStatus::InProgress) | Some(TranscriptionJobStatus::Queued) => {
                    tracing::debug!(
                        "Transcribing... ({}s elapsed, check #{})",
                        start_time.elapsed().as_secs(),
                        check_count
                    );
                    sleep(poll_delay(self.base_interval, check_count)).await;
                }
                Some(TranscriptionJobStatus::Completed) => break job,
                Some(TranscriptionJobStatus::Failed) => {
                    let failure_reason = job.failure_reason().unwrap_or("Unknown error");
                    anyhow::bail!("Transcription job failed: {}", failure_reason);
                }
                _ => anyhow::bail!("Unexpected transcription job status"),
            }
        };

        tracing::info!(
            "Transcription job {} completed in {}s",
            self.job_id,
            start_time.elapsed().as_secs()
        );

        let transcript_uri = job
            .transcript()
            .and_then(|t| t.transcript_file_uri())
            .ok_or_else(|| anyhow::anyhow!("No transcript URI found"))?;

        let transcript_json = download_transcript(transcript_uri).await?;
        extract_text(&transcript_json)
    }

    /// Get transcription job details
    async fn get_transcription_job(&self) -> Result<TranscriptionJob> {
        let response = self
            .client
            .get_transcription_job()
            .transcription_job_name(&self.job_id)
            .send()
            .await
            .context("Failed to get transcription job status")?;

        response
            .transcription_job()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Transcription job not found"))
    }
}

/// Grows by two seconds per check, capped at thirty
fn poll_delay(base: Duration, check_count: u32) -> Duration {
    let grown = base + Duration::from_secs(2 * u64::from(check_count.saturating_sub(1)));
    grown.min(Duration::from_secs(30))
}

async fn download_transcript(uri: &str) -> Result<String> {
    let response = reqwest::get(uri).await.context("Failed to download transcript")?;

    if !response.status().is_success() {
        anyhow::bail!("Failed to download transcript: HTTP {}", response.status());
    }

    response.text().await.context("Failed to read transcript content")
}

fn extract_text(transcript_json: &str) -> Result<String> {
    let transcript: AwsTranscript =
        serde_json::from_str(transcript_json).context("Failed to parse transcript JSON")?;

    Ok(transcript
        .results
        .transcripts
        .into_iter()
        .map(|t| t.transcript)
        .collect::<Vec<_>>()
        .join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_transcript_text() {
        let json = r#"{
            "jobName": "video_scribe_1",
            "accountId": "123",
            "status": "COMPLETED",
            "results": {
                "transcripts": [{"transcript": "hello there"}],
                "items": []
            }
        }"#;
        assert_eq!(extract_text(json).unwrap(), "hello there");
    }

    #[test]
    fn malformed_transcript_is_an_error() {
        assert!(extract_text("{\"results\": {}}").is_err());
    }

    #[test]
    fn poll_delay_is_capped() {
        let base = Duration::from_secs(5);
        assert_eq!(poll_delay(base, 1), Duration::from_secs(5));
        assert_eq!(poll_delay(base, 3), Duration::from_secs(9));
        assert_eq!(poll_delay(base, 100), Duration::from_secs(30));
    }
}
