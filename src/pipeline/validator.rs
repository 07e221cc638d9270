use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::extractors::{validate_url, MediaSource};
use crate::utils::is_safe_path_segment;
use crate::PipelineError;

/// A URL resolved to a concrete, admissible video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    pub url: String,
    pub resolved_id: String,
    pub title: String,
    pub duration_seconds: u64,
    pub thumbnail_url: String,
}

/// Admission control: metadata lookup plus the duration ceiling
#[derive(Clone)]
pub struct MetadataValidator {
    source: Arc<dyn MediaSource>,
    max_duration_seconds: u64,
}

impl MetadataValidator {
    pub fn new(source: Arc<dyn MediaSource>, max_duration_seconds: u64) -> Self {
        Self {
            source,
            max_duration_seconds,
        }
    }

    /// Resolve metadata for `url` and reject anything over the ceiling
    pub async fn validate(&self, url: &str) -> Result<SourceReference, PipelineError> {
        let parsed = validate_url(url).map_err(|e| PipelineError::InvalidSource(e.to_string()))?;
        let url = parsed.as_str();

        let metadata = self
            .source
            .resolve_metadata(url)
            .await
            .map_err(|e| PipelineError::InvalidSource(format!("{:#}", e)))?;

        if metadata.is_live {
            return Err(PipelineError::InvalidSource(format!(
                "{} is a live stream",
                metadata.id
            )));
        }

        if !is_safe_path_segment(&metadata.id) {
            return Err(PipelineError::InvalidSource(format!(
                "Unusable video id from source: {:?}",
                metadata.id
            )));
        }

        let duration = metadata
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| {
                PipelineError::InvalidSource(format!("Could not determine the duration of {}", metadata.id))
            })?;

        // Partial seconds count against the ceiling
        let duration_seconds = duration.ceil() as u64;
        if duration_seconds > self.max_duration_seconds {
            return Err(PipelineError::DurationExceeded {
                duration: duration_seconds,
                limit: self.max_duration_seconds,
            });
        }

        tracing::info!(
            "Admitted {} ({}s): {}",
            metadata.id,
            duration_seconds,
            metadata.title
        );

        Ok(SourceReference {
            url: url.to_string(),
            resolved_id: metadata.id,
            title: metadata.title,
            duration_seconds,
            thumbnail_url: metadata.thumbnail.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{MockMediaSource, SourceMetadata};

    fn source_with(duration: Option<f64>, is_live: bool) -> MockMediaSource {
        let mut source = MockMediaSource::new();
        source.expect_resolve_metadata().returning(move |_| {
            Ok(SourceMetadata {
                id: "abc123".into(),
                title: "Clip".into(),
                duration,
                thumbnail: Some("https://img/abc123.jpg".into()),
                is_live,
            })
        });
        source.expect_download().times(0);
        source
    }

    #[tokio::test]
    async fn admits_short_video() {
        let validator = MetadataValidator::new(Arc::new(source_with(Some(60.0), false)), 180);
        let reference = validator.validate("https://youtu.be/abc123").await.unwrap();

        assert_eq!(reference.resolved_id, "abc123");
        assert_eq!(reference.duration_seconds, 60);
        assert_eq!(reference.thumbnail_url, "https://img/abc123.jpg");
    }

    #[tokio::test]
    async fn ceiling_is_inclusive() {
        let validator = MetadataValidator::new(Arc::new(source_with(Some(180.0), false)), 180);
        assert!(validator.validate("https://youtu.be/abc123").await.is_ok());

        let validator = MetadataValidator::new(Arc::new(source_with(Some(180.4), false)), 180);
        let err = validator.validate("https://youtu.be/abc123").await.unwrap_err();
        assert!(matches!(err, PipelineError::DurationExceeded { duration: 181, limit: 180 }));
    }

    #[tokio::test]
    async fn rejects_long_video_with_ceiling_in_message() {
        let validator = MetadataValidator::new(Arc::new(source_with(Some(200.0), false)), 180);
        let err = validator.validate("https://youtu.be/abc123").await.unwrap_err();
        assert!(err.to_string().contains("180s"));
    }

    #[tokio::test]
    async fn rejects_live_and_unknown_duration() {
        let validator = MetadataValidator::new(Arc::new(source_with(Some(30.0), true)), 180);
        assert!(matches!(
            validator.validate("https://youtu.be/abc123").await,
            Err(PipelineError::InvalidSource(_))
        ));

        let validator = MetadataValidator::new(Arc::new(source_with(None, false)), 180);
        assert!(matches!(
            validator.validate("https://youtu.be/abc123").await,
            Err(PipelineError::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn malformed_url_never_hits_the_source() {
        let mut source = MockMediaSource::new();
        source.expect_resolve_metadata().times(0);

        let validator = MetadataValidator::new(Arc::new(source), 180);
        assert!(matches!(
            validator.validate("file:///etc/passwd").await,
            Err(PipelineError::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn unresolvable_url_is_invalid_source() {
        let mut source = MockMediaSource::new();
        source
            .expect_resolve_metadata()
            .returning(|_| Err(anyhow::anyhow!("yt-dlp failed: ERROR: Video unavailable")));

        let validator = MetadataValidator::new(Arc::new(source), 180);
        let err = validator.validate("https://youtu.be/gone").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSource(ref m) if m.contains("Video unavailable")));
    }
}
