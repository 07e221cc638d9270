use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub mod aws;
pub mod processor;
pub mod whisper;

pub use aws::AwsTranscribeEngine;
pub use whisper::WhisperCliEngine;

use crate::PipelineError;

/// Text produced from an audio artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
}

/// Speech-to-text capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe the audio file at `audio_path`
    async fn transcribe(&self, audio_path: &Path) -> crate::Result<String>;

    /// Name used in logs
    fn engine_name(&self) -> &'static str;
}

/// Runs the configured engine against an acquired audio file
#[derive(Clone)]
pub struct TranscriptionAdapter {
    engine: Arc<dyn TranscriptionEngine>,
}

impl TranscriptionAdapter {
    pub fn new(engine: Arc<dyn TranscriptionEngine>) -> Self {
        Self { engine }
    }

    pub async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult, PipelineError> {
        if !audio_path.is_file() {
            return Err(PipelineError::Transcription(format!(
                "Audio file not found: {}",
                audio_path.display()
            )));
        }

        tracing::info!(
            engine = self.engine.engine_name(),
            "Transcribing {}",
            audio_path.display()
        );

        let text = self
            .engine
            .transcribe(audio_path)
            .await
            .map_err(|e| PipelineError::Transcription(format!("{:#}", e)))?;

        Ok(TranscriptionResult {
            text: text.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn trims_engine_output() {
        let audio = tempfile::NamedTempFile::new().unwrap();
        let path = audio.path().to_path_buf();
        let expected = path.clone();

        let mut engine = MockTranscriptionEngine::new();
        engine
            .expect_transcribe()
            .withf(move |p| p == expected.as_path())
            .times(1)
            .returning(|_| Ok("  こんにちは世界 \n".to_string()));
        engine.expect_engine_name().return_const("mock");

        let adapter = TranscriptionAdapter::new(Arc::new(engine));
        let result = adapter.transcribe(&path).await.unwrap();
        assert_eq!(result.text, "こんにちは世界");
    }

    #[tokio::test]
    async fn engine_fault_becomes_transcription_error() {
        let audio = tempfile::NamedTempFile::new().unwrap();

        let mut engine = MockTranscriptionEngine::new();
        engine
            .expect_transcribe()
            .returning(|_| Err(anyhow::anyhow!("unsupported codec")));
        engine.expect_engine_name().return_const("mock");

        let adapter = TranscriptionAdapter::new(Arc::new(engine));
        let err = adapter.transcribe(audio.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Transcription(ref m) if m.contains("unsupported codec")));
    }

    #[tokio::test]
    async fn missing_file_never_reaches_engine() {
        let mut engine = MockTranscriptionEngine::new();
        engine.expect_transcribe().times(0);

        let adapter = TranscriptionAdapter::new(Arc::new(engine));
        let err = adapter
            .transcribe(&PathBuf::from("/definitely/not/here.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transcription(_)));
    }
}
