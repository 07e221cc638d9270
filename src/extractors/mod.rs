use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

pub mod youtube;

use crate::Result;

/// Metadata resolved for a URL without downloading the media body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Canonical id assigned by the media source
    pub id: String,

    pub title: String,

    /// Duration in seconds, if the source reports one
    pub duration: Option<f64>,

    pub thumbnail: Option<String>,

    /// Live or upcoming streams cannot be processed
    pub is_live: bool,
}

/// Where and how to download a source
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Directory the files are written to
    pub output_dir: PathBuf,

    /// File stem for every produced file
    pub file_stem: String,

    /// Keep the video container next to the extracted audio
    pub keep_video: bool,
}

/// Files produced by a download
#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    /// Extracted audio track
    pub audio_path: PathBuf,

    /// Video container, when it was kept
    pub container_path: Option<PathBuf>,
}

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Wav,
    Flac,
    Ogg,
    Webm,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Webm => "webm",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" | "aac" => Some(AudioFormat::M4a),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "ogg" => Some(AudioFormat::Ogg),
            "webm" => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Webm => "audio/webm",
        }
    }
}

/// Guess a MIME type for any media file we may upload
pub fn media_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if let Some(format) = AudioFormat::from_extension(&ext) {
        return format.mime_type();
    }

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// Capability for resolving and fetching remote media
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Resolve metadata only; must not download the media body
    async fn resolve_metadata(&self, url: &str) -> Result<SourceMetadata>;

    /// Download audio (and optionally video) for the URL
    async fn download(&self, url: &str, request: &DownloadRequest) -> Result<DownloadedMedia>;

    /// Get the name of this source
    fn platform_name(&self) -> &'static str;
}

/// Validate and normalize URLs
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim()).map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        anyhow::bail!("URL has no host: {}", url);
    }

    Ok(parsed)
}
