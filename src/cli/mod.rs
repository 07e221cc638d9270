use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scribe",
    about = "Video Scribe - transcribe and translate short videos from a URL",
    version,
    long_about = "Validates a video URL against a duration limit, downloads its audio with yt-dlp, transcribes it with Whisper or AWS Transcribe, translates the transcript, and stores the media, texts and a Markdown report."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./config.yaml or the user config dir)
    #[arg(short, long, global = true, value_name = "FILE", env = "VIDEO_SCRIBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline for a video URL
    Process {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Check a URL against the duration limit without downloading it
    Validate {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// List stored records, newest first
    List {
        /// Maximum number of records
        #[arg(short, long)]
        limit: Option<i64>,

        /// Only the record for this YouTube id
        #[arg(long, value_name = "ID")]
        youtube_id: Option<String>,

        /// Only records carrying this tag
        #[arg(long)]
        tag: Option<String>,

        /// Only records created at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_since)]
        since: Option<DateTime<Utc>>,
    },

    /// Show one record with its tags and processing log
    Show {
        #[arg(value_name = "YOUTUBE_ID")]
        youtube_id: String,
    },

    /// List all tags
    Tags,

    /// Attach a tag to a record
    Tag {
        #[arg(value_name = "YOUTUBE_ID")]
        youtube_id: String,

        tag: String,
    },

    /// Show or initialise the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Check that the external tools are installed
    Doctor,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per line
    Json,
}

fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| Utc.from_utc_datetime(&at))
        .ok_or_else(|| format!("expected RFC 3339 or YYYY-MM-DD, got {:?}", value))
}
