use anyhow::{Context, Result};
use aws_types::region::Region;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default ceiling for admitted videos, in seconds
pub const DEFAULT_MAX_DURATION_SECONDS: u64 = 180;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Media source (yt-dlp) settings
    pub source: SourceConfig,

    /// Object storage for the retained media
    pub storage: StorageConfig,

    /// Relational store for video records
    pub database: DatabaseConfig,

    /// Transcription engine settings
    pub transcription: TranscriptionConfig,

    /// Translation service settings
    pub translation: TranslationConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the yt-dlp binary
    pub yt_dlp_path: String,

    /// Longest video admitted for processing
    pub max_duration_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// AWS region
    pub region: String,

    /// Bucket holding the uploaded videos
    pub bucket: String,

    /// Key prefix for uploaded videos
    pub key_prefix: String,

    /// Custom endpoint for S3-compatible stores
    pub endpoint_url: Option<String>,

    /// Root directory for the local backend
    pub local_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL
    pub url: String,

    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionBackend {
    Whisper,
    Aws,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub engine: TranscriptionBackend,

    /// Whisper CLI binary
    pub whisper_path: String,

    /// Whisper model name
    pub whisper_model: String,

    /// Spoken language hint passed to the engine
    pub language: Option<String>,

    /// Bucket for temporary audio uploads (AWS engine)
    pub aws_bucket: Option<String>,

    /// Key prefix for temporary audio uploads (AWS engine)
    pub aws_key_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// OpenAI-compatible chat completions endpoint
    pub endpoint: String,

    pub model: String,

    /// API credential; `OPENAI_API_KEY` overrides it
    pub api_key: Option<String>,

    /// Language of the transcript, used as a prompt hint
    pub source_language: String,

    /// Language to translate into
    pub target_language: String,

    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scratch directory for downloads
    pub scratch_dir: PathBuf,

    /// Directory for generated reports and the reconciliation journal
    pub output_dir: PathBuf,

    /// Keep the downloaded video file after it was uploaded
    pub keep_video: bool,

    /// Upper bound for any single stage
    pub stage_timeout_seconds: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                yt_dlp_path: "yt-dlp".to_string(),
                max_duration_seconds: DEFAULT_MAX_DURATION_SECONDS,
            },
            storage: StorageConfig {
                backend: StorageBackend::S3,
                region: "us-east-1".to_string(),
                bucket: "videos".to_string(),
                key_prefix: "videos/".to_string(),
                endpoint_url: None,
                local_root: PathBuf::from("storage"),
            },
            database: DatabaseConfig {
                url: "sqlite://video-scribe.db".to_string(),
                max_connections: 5,
            },
            transcription: TranscriptionConfig {
                engine: TranscriptionBackend::Whisper,
                whisper_path: "whisper".to_string(),
                whisper_model: "base".to_string(),
                language: None,
                aws_bucket: None,
                aws_key_prefix: Some("transcribe/".to_string()),
            },
            translation: TranslationConfig {
                endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
                model: "o3-mini".to_string(),
                api_key: None,
                source_language: "Japanese".to_string(),
                target_language: "English".to_string(),
                timeout_seconds: 120,
            },
            app: AppConfig {
                scratch_dir: PathBuf::from("downloads"),
                output_dir: PathBuf::from("outputs"),
                keep_video: true,
                stage_timeout_seconds: Some(900),
            },
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, the working directory, or the user config dir
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::read_from(path)?,
            None => {
                let config_path = Self::config_path()?;
                if config_path.exists() {
                    Self::read_from(&config_path)?
                } else {
                    let config = Self::default();
                    config.save_to(&config_path)?;
                    config
                }
            }
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn read_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        serde_yaml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("video-scribe").join("config.yaml"))
    }

    /// Environment variables win over the file for credentials and connection strings
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.translation.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = url;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.source.max_duration_seconds == 0 {
            anyhow::bail!("source.max_duration_seconds must be greater than zero");
        }

        if self.storage.backend == StorageBackend::S3 && self.storage.bucket.is_empty() {
            anyhow::bail!("Storage bucket must be configured");
        }

        if self.transcription.engine == TranscriptionBackend::Aws
            && self.transcription.aws_bucket.as_deref().unwrap_or("").is_empty()
        {
            anyhow::bail!("transcription.aws_bucket is required for the aws engine");
        }

        if self.translation.target_language.trim().is_empty() {
            anyhow::bail!("translation.target_language must not be empty");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  yt-dlp: {}", self.source.yt_dlp_path);
        println!("  Max Duration: {}s", self.source.max_duration_seconds);
        println!("  Storage: {:?} bucket={} prefix={}", self.storage.backend, self.storage.bucket, self.storage.key_prefix);
        if let Some(endpoint) = &self.storage.endpoint_url {
            println!("  Storage Endpoint: {}", endpoint);
        }
        println!("  Database: {}", self.database.url);
        println!("  Transcription: {:?} (model {})", self.transcription.engine, self.transcription.whisper_model);
        println!(
            "  Translation: {} -> {} via {} ({})",
            self.translation.source_language,
            self.translation.target_language,
            self.translation.model,
            self.translation.endpoint
        );
        println!(
            "  API Key: {}",
            if self.translation.api_key.is_some() { "set" } else { "not set" }
        );
        println!("  Scratch Dir: {}", self.app.scratch_dir.display());
        println!("  Output Dir: {}", self.app.output_dir.display());
        println!("  Keep Video: {}", self.app.keep_video);
    }

    /// Get AWS region
    pub fn aws_region(&self) -> Region {
        Region::new(self.storage.region.clone())
    }
}
