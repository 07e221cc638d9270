use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod openai;

pub use openai::OpenAiTranslator;

use crate::PipelineError;

/// Translated transcript text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub text: String,
}

/// Failures reported by a translation service
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("nothing to translate")]
    EmptyInput,

    #[error("authentication rejected (HTTP {status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("rate limited (HTTP 429): {0}")]
    RateLimited(String),

    #[error("service error (HTTP {status}): {body}")]
    Service { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("API credential is not configured")]
    MissingCredential,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Text translation capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, TranslateError>;
}

/// Sends transcripts to the translation service; any failure ends the run
#[derive(Clone)]
pub struct TranslationAdapter {
    translator: Arc<dyn Translator>,
}

impl TranslationAdapter {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self { translator }
    }

    pub async fn translate(
        &self,
        text: &str,
        source_lang_hint: &str,
        target_lang: &str,
    ) -> Result<TranslationResult, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::Translation(TranslateError::EmptyInput.to_string()));
        }

        tracing::info!("Translating {} chars {} -> {}", text.chars().count(), source_lang_hint, target_lang);

        let translated = self
            .translator
            .translate(text, source_lang_hint, target_lang)
            .await
            .map_err(|e| PipelineError::Translation(e.to_string()))?;

        let translated = translated.trim();
        if translated.is_empty() {
            return Err(PipelineError::Translation(
                TranslateError::Malformed("empty translation".to_string()).to_string(),
            ));
        }

        Ok(TranslationResult {
            text: translated.to_string(),
        })
    }
}
