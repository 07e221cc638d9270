use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::utils::sanitize_filename;

/// Everything that goes into a human readable report
#[derive(Debug, Clone)]
pub struct Report<'a> {
    pub youtube_id: &'a str,
    pub source_url: &'a str,
    pub transcription: &'a str,
    pub translation: &'a str,
    pub target_language: &'a str,
    pub processed_at: DateTime<Local>,
}

/// Render a report as Markdown
pub fn format_report(report: &Report<'_>) -> String {
    format!(
        "# Transcription & Translation Report\n\
         \n\
         ## Source\n\
         - URL: {url}\n\
         - Processed at: {at}\n\
         \n\
         ## Transcription\n\
         {transcription}\n\
         \n\
         ## Translation ({language})\n\
         {translation}\n",
        url = report.source_url,
        at = report.processed_at.format("%Y-%m-%d %H:%M:%S"),
        transcription = report.transcription,
        language = report.target_language,
        translation = report.translation,
    )
}

/// File name for a report: `<id>_<YYYYmmdd_HHMMSS>.md`
pub fn report_file_name(youtube_id: &str, processed_at: DateTime<Local>) -> String {
    format!(
        "{}_{}.md",
        sanitize_filename(youtube_id),
        processed_at.format("%Y%m%d_%H%M%S")
    )
}

/// Save a report under `output_dir` and return its path
pub fn save_report(report: &Report<'_>, output_dir: &Path) -> Result<PathBuf> {
    fs_err::create_dir_all(output_dir)?;

    let path = output_dir.join(report_file_name(report.youtube_id, report.processed_at));
    fs_err::write(&path, format_report(report))?;

    Ok(path)
}

/// Print any serializable envelope to the console as pretty JSON
pub fn print_to_console<T: Serialize>(value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    println!("{}", content);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(at: DateTime<Local>) -> Report<'static> {
        Report {
            youtube_id: "abc123",
            source_url: "https://www.youtube.com/watch?v=abc123",
            transcription: "こんにちは",
            translation: "Hello",
            target_language: "English",
            processed_at: at,
        }
    }

    #[test]
    fn report_has_fixed_headings() {
        let at = Local.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let text = format_report(&sample(at));

        assert!(text.starts_with("# Transcription & Translation Report\n"));
        assert!(text.contains("- URL: https://www.youtube.com/watch?v=abc123\n"));
        assert!(text.contains("- Processed at: 2024-03-01 09:30:00\n"));
        assert!(text.contains("## Transcription\nこんにちは\n"));
        assert!(text.contains("## Translation (English)\nHello\n"));
    }

    #[test]
    fn saves_under_timestamped_name() {
        let dir = tempfile::tempdir().unwrap();
        let at = Local.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();

        let path = save_report(&sample(at), &dir.path().join("outputs")).unwrap();
        assert_eq!(path.file_name().unwrap(), "abc123_20240301_093000.md");
        assert!(fs_err::read_to_string(&path).unwrap().contains("Hello"));
    }
}
