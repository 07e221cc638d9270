use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::validator::SourceReference;
use crate::extractors::{AudioFormat, DownloadRequest, MediaSource};
use crate::PipelineError;

/// Files downloaded for one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArtifact {
    pub id: String,
    pub container_path: Option<PathBuf>,
    pub audio_path: PathBuf,
    pub format: AudioFormat,
}

impl MediaArtifact {
    /// The file that gets uploaded: the video when kept, otherwise the audio
    pub fn retained_path(&self) -> &Path {
        self.container_path.as_deref().unwrap_or(&self.audio_path)
    }
}

/// Exclusive ownership of `<scratch>/<id>` for one invocation
///
/// Held through `<scratch>/<id>.lock`, created exclusively so that separate processes sharing a
/// scratch root exclude each other too. The lock file is removed on drop.
#[derive(Debug)]
pub struct ScratchClaim {
    id: String,
    dir: PathBuf,
    lock_path: PathBuf,
}

impl ScratchClaim {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete every file in the namespace except `keep`; failures are logged only
    pub async fn remove_transient(&self, keep: Option<&Path>) -> Vec<PathBuf> {
        let mut removed = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return removed,
            Err(e) => {
                tracing::warn!("Could not list scratch dir {}: {}", self.dir.display(), e);
                return removed;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Could not read scratch dir {}: {}", self.dir.display(), e);
                    break;
                }
            };
            let path = entry.path();
            if keep == Some(path.as_path()) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed.push(path),
                Err(e) => tracing::warn!("Failed to remove scratch file {}: {}", path.display(), e),
            }
        }

        if keep.is_none() {
            if let Err(e) = tokio::fs::remove_dir(&self.dir).await {
                tracing::debug!("Scratch dir {} left in place: {}", self.dir.display(), e);
            }
        }

        removed
    }
}

impl Drop for ScratchClaim {
    fn drop(&mut self) {
        if let Err(e) = fs_err::remove_file(&self.lock_path) {
            tracing::warn!("Could not release scratch claim for {}: {}", self.id, e);
        }
    }
}

/// Downloads media for admitted sources into per-id scratch namespaces
#[derive(Clone)]
pub struct MediaAcquirer {
    source: Arc<dyn MediaSource>,
    scratch_root: PathBuf,
    keep_video: bool,
}

impl MediaAcquirer {
    pub fn new(source: Arc<dyn MediaSource>, scratch_root: impl Into<PathBuf>, keep_video: bool) -> Self {
        Self {
            source,
            scratch_root: scratch_root.into(),
            keep_video,
        }
    }

    /// Claim the scratch namespace for `id`; fails while any run, in any process, holds it
    pub fn claim(&self, id: &str) -> Result<ScratchClaim, PipelineError> {
        let lock_path = self.scratch_root.join(format!("{}.lock", id));

        let mut lock = match fs_err::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(lock) => lock,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PipelineError::Acquisition(format!(
                    "{} is already being processed (remove {} if no run is active)",
                    id,
                    lock_path.display()
                )))
            }
            Err(e) => {
                return Err(PipelineError::Acquisition(format!(
                    "Cannot claim scratch namespace for {}: {}",
                    id, e
                )))
            }
        };

        // Owner pid, for whoever finds a stale lock
        if let Err(e) = writeln!(lock, "{}", std::process::id()) {
            tracing::debug!("Could not write owner to {}: {}", lock_path.display(), e);
        }

        Ok(ScratchClaim {
            id: id.to_string(),
            dir: self.scratch_root.join(id),
            lock_path,
        })
    }

    /// Download the lowest practical audio quality, plus the video when configured
    pub async fn acquire(
        &self,
        source: &SourceReference,
        claim: &ScratchClaim,
    ) -> Result<MediaArtifact, PipelineError> {
        if claim.id() != source.resolved_id {
            return Err(PipelineError::Acquisition(format!(
                "scratch claim {} does not match {}",
                claim.id(),
                source.resolved_id
            )));
        }

        // The scratch root itself is provisioned up front; only the per-id dir is ours.
        // It may still hold the video kept by an earlier run; the claim makes reuse safe.
        match tokio::fs::create_dir(claim.dir()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(PipelineError::Acquisition(format!(
                    "Cannot create scratch dir {}: {}",
                    claim.dir().display(),
                    e
                )))
            }
        }

        let request = DownloadRequest {
            output_dir: claim.dir().to_path_buf(),
            file_stem: source.resolved_id.clone(),
            keep_video: self.keep_video,
        };

        tracing::info!(
            "Downloading {} via {} (keep video: {})",
            source.resolved_id,
            self.source.platform_name(),
            self.keep_video
        );

        let media = self
            .source
            .download(&source.url, &request)
            .await
            .map_err(|e| PipelineError::Acquisition(format!("{:#}", e)))?;

        let format = media
            .audio_path
            .extension()
            .and_then(|ext| AudioFormat::from_extension(&ext.to_string_lossy()))
            .ok_or_else(|| {
                PipelineError::Acquisition(format!(
                    "Unsupported audio format: {}",
                    media.audio_path.display()
                ))
            })?;

        if !media.audio_path.is_file() {
            return Err(PipelineError::Acquisition(format!(
                "No audio track at {}",
                media.audio_path.display()
            )));
        }

        Ok(MediaArtifact {
            id: source.resolved_id.clone(),
            container_path: media.container_path.filter(|p| p.is_file()),
            audio_path: media.audio_path,
            format,
        })
    }
}
