use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;

use super::TranscriptionEngine;

/// Local transcription through the `whisper` command line tool
#[derive(Debug, Clone)]
pub struct WhisperCliEngine {
    binary: String,
    model: String,
    language: Option<String>,
}

impl WhisperCliEngine {
    pub fn new(binary: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            language: None,
        }
    }

    /// Pin the spoken language instead of letting whisper guess
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    fn command_args(&self, audio_path: &Path, output_dir: &Path) -> Vec<String> {
        let mut args = vec![
            audio_path.to_string_lossy().into_owned(),
            "--model".to_string(),
            self.model.clone(),
            "--output_format".to_string(),
            "txt".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().into_owned(),
            "--verbose".to_string(),
            "False".to_string(),
        ];
        if let Some(language) = &self.language {
            args.push("--language".to_string());
            args.push(language.clone());
        }
        args
    }

    /// whisper names its output after the input file stem
    fn transcript_path(audio_path: &Path, output_dir: &Path) -> Result<PathBuf> {
        let stem = audio_path
            .file_stem()
            .ok_or_else(|| anyhow!("Audio path has no file name: {}", audio_path.display()))?;
        Ok(output_dir.join(format!("{}.txt", stem.to_string_lossy())))
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperCliEngine {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let output_dir = TempDir::new().context("Failed to create whisper output directory")?;

        tracing::debug!("Running {} (model {}) on {}", self.binary, self.model, audio_path.display());

        let output = Command::new(&self.binary)
            .args(self.command_args(audio_path, output_dir.path()))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.binary))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("whisper exited with {}: {}", output.status, error.trim());
        }

        let transcript_path = Self::transcript_path(audio_path, output_dir.path())?;
        let text = fs_err::read_to_string(&transcript_path)
            .context("whisper did not produce a transcript")?;

        Ok(text)
    }

    fn engine_name(&self) -> &'static str {
        "whisper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_model_and_language() {
        let engine = WhisperCliEngine::new("whisper", "base").with_language(Some("ja".into()));
        let args = engine.command_args(Path::new("/tmp/abc.mp3"), Path::new("/tmp/out"));

        assert_eq!(args[0], "/tmp/abc.mp3");
        assert!(args.windows(2).any(|w| w[0] == "--model" && w[1] == "base"));
        assert!(args.windows(2).any(|w| w[0] == "--language" && w[1] == "ja"));
    }

    #[test]
    fn transcript_named_after_audio_stem() {
        let path =
            WhisperCliEngine::transcript_path(Path::new("/scratch/abc/abc.mp3"), Path::new("/out")).unwrap();
        assert_eq!(path, PathBuf::from("/out/abc.txt"));
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let audio = tempfile::NamedTempFile::new().unwrap();
        let engine = WhisperCliEngine::new("whisper-binary-that-does-not-exist", "base");
        assert!(engine.transcribe(audio.path()).await.is_err());
    }
}
