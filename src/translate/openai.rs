use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{TranslateError, Translator};
use crate::config::TranslationConfig;

/// Translator backed by an OpenAI-compatible chat completions endpoint
pub struct OpenAiTranslator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl OpenAiTranslator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TranslateError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }

    pub fn from_config(config: &TranslationConfig) -> Result<Self, TranslateError> {
        Self::new(
            &config.endpoint,
            &config.model,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }
}

fn system_prompt(source_language: &str, target_language: &str) -> String {
    format!("Translate the following {} text to {}:", source_language, target_language)
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, TranslateError> {
        let api_key = self.api_key.as_deref().ok_or(TranslateError::MissingCredential)?;

        let prompt = system_prompt(source_language, target_language);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };

        tracing::debug!("Sending translation request to {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TranslateError::Unauthorized {
                    status: status.as_u16(),
                    body,
                },
                StatusCode::TOO_MANY_REQUESTS => TranslateError::RateLimited(body),
                _ => TranslateError::Service {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::Malformed(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| TranslateError::Malformed("response has no message content".to_string()))
    }
}
