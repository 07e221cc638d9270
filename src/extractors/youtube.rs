use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{DownloadRequest, DownloadedMedia, MediaSource, SourceMetadata};
use crate::Result;

/// Extension of the extracted audio track
pub const AUDIO_EXTENSION: &str = "mp3";

/// Media source backed by yt-dlp
pub struct YtDlpSource {
    yt_dlp_path: String,
}

impl YtDlpSource {
    pub fn new(yt_dlp_path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new(&self.yt_dlp_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run {}: {}", self.yt_dlp_path, e))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", error.trim());
        }

        Ok(output.stdout)
    }

    /// yt-dlp arguments for an audio download, optionally keeping the video
    fn download_args(url: &str, request: &DownloadRequest) -> Vec<String> {
        let template = request
            .output_dir
            .join(format!("{}.%(ext)s", request.file_stem))
            .to_string_lossy()
            .into_owned();

        // Smallest stream that still carries speech; with a video we need a muxed format
        let format = if request.keep_video {
            "worst[ext=mp4][acodec!=none]/worst[acodec!=none]/worst"
        } else {
            "worstaudio[acodec^=mp4a]/worstaudio[ext=m4a]/worstaudio[ext=mp3]/worstaudio"
        };

        let mut args = vec![
            "--output".to_string(),
            template,
            "--format".to_string(),
            format.to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            AUDIO_EXTENSION.to_string(),
            "--audio-quality".to_string(),
            "9".to_string(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--concurrent-fragments".to_string(),
            "4".to_string(),
        ];
        if request.keep_video {
            args.push("--keep-video".to_string());
        }
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn resolve_metadata(&self, url: &str) -> Result<SourceMetadata> {
        tracing::debug!("Resolving metadata for: {}", url);

        let stdout = self
            .run(&["--dump-json", "--no-playlist", "--skip-download", url])
            .await?;

        let info: Value = serde_json::from_slice(&stdout)?;
        parse_metadata(&info)
    }

    async fn download(&self, url: &str, request: &DownloadRequest) -> Result<DownloadedMedia> {
        tracing::debug!("Downloading {} into {}", url, request.output_dir.display());

        let args = Self::download_args(url, request);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args).await?;

        locate_outputs(&request.output_dir, &request.file_stem, request.keep_video).await
    }

    fn platform_name(&self) -> &'static str {
        "yt-dlp"
    }
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

fn parse_metadata(info: &Value) -> Result<SourceMetadata> {
    let id = info["id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow::anyhow!("yt-dlp returned no video id"))?
        .to_string();

    let live_status = info["live_status"].as_str().unwrap_or("not_live");

    Ok(SourceMetadata {
        id,
        title: info["title"].as_str().unwrap_or_default().to_string(),
        duration: info["duration"].as_f64(),
        thumbnail: info["thumbnail"].as_str().map(|s| s.to_string()),
        is_live: info["is_live"].as_bool().unwrap_or(false)
            || matches!(live_status, "is_live" | "is_upcoming"),
    })
}

/// Find the extracted audio and the kept container among the files yt-dlp wrote
async fn locate_outputs(dir: &Path, stem: &str, keep_video: bool) -> Result<DownloadedMedia> {
    let audio_path = dir.join(format!("{}.{}", stem, AUDIO_EXTENSION));
    if !tokio::fs::try_exists(&audio_path).await.unwrap_or(false) {
        anyhow::bail!("No audio track was extracted for {}", stem);
    }

    let mut container_path: Option<PathBuf> = None;
    if keep_video {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let matches_stem = path.file_stem().map_or(false, |s| s.to_string_lossy() == stem);
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if matches_stem && ext != AUDIO_EXTENSION && !is_partial_download(&ext) {
                container_path = Some(path);
                break;
            }
        }
    }

    Ok(DownloadedMedia {
        audio_path,
        container_path,
    })
}

/// Fragments yt-dlp leaves behind on an interrupted download
pub fn is_partial_download(ext: &str) -> bool {
    matches!(ext, "part" | "ytdl" | "temp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_dump_json_metadata() {
        let info = json!({
            "id": "dQw4w9WgXcQ",
            "title": "Some video",
            "duration": 61.5,
            "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg",
            "live_status": "not_live"
        });

        let meta = parse_metadata(&info).unwrap();
        assert_eq!(meta.id, "dQw4w9WgXcQ");
        assert_eq!(meta.duration, Some(61.5));
        assert!(!meta.is_live);
    }

    #[test]
    fn flags_live_streams() {
        let info = json!({"id": "live1", "title": "Live", "live_status": "is_live"});
        let meta = parse_metadata(&info).unwrap();
        assert!(meta.is_live);
        assert_eq!(meta.duration, None);
    }

    #[test]
    fn missing_id_is_an_error() {
        assert!(parse_metadata(&json!({"title": "x"})).is_err());
    }

    #[test]
    fn download_args_keep_video_only_when_asked() {
        let request = DownloadRequest {
            output_dir: PathBuf::from("downloads/abc"),
            file_stem: "abc".into(),
            keep_video: false,
        };
        let args = YtDlpSource::download_args("https://youtu.be/abc", &request);
        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(!args.contains(&"--keep-video".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");

        let request = DownloadRequest {
            keep_video: true,
            ..request
        };
        let args = YtDlpSource::download_args("https://youtu.be/abc", &request);
        assert!(args.contains(&"--keep-video".to_string()));
    }

    #[tokio::test]
    async fn locates_audio_and_container() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("abc.mp3"), b"audio").unwrap();
        fs_err::write(dir.path().join("abc.mp4"), b"video").unwrap();
        fs_err::write(dir.path().join("abc.mp4.part"), b"partial").unwrap();

        let media = locate_outputs(dir.path(), "abc", true).await.unwrap();
        assert_eq!(media.audio_path, dir.path().join("abc.mp3"));
        assert_eq!(media.container_path, Some(dir.path().join("abc.mp4")));
    }

    #[tokio::test]
    async fn missing_audio_track_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("abc.mp4"), b"video").unwrap();

        assert!(locate_outputs(dir.path(), "abc", true).await.is_err());
    }
}
