use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the journal inside the output directory
pub const JOURNAL_FILE_NAME: &str = "reconciliation.jsonl";

/// An uploaded blob with no record pointing at it, plus the record that should have been inserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    pub occurred_at: DateTime<Utc>,
    pub youtube_id: String,
    pub youtube_url: String,
    pub blob_path: String,
    pub blob_location: String,
    pub transcription: String,
    pub translation: String,
    pub reason: String,
}

/// Append-only JSON lines file of blobs that need manual reconciliation
#[derive(Debug, Clone)]
pub struct ReconciliationJournal {
    path: PathBuf,
}

impl ReconciliationJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(JOURNAL_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &ReconciliationEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(entry).context("Failed to serialize journal entry")?;
        let mut file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;

        Ok(())
    }

    /// Every entry written so far; a missing journal is empty
    pub fn entries(&self) -> Result<Vec<ReconciliationEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        fs_err::read_to_string(&self.path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Corrupt reconciliation journal line"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> ReconciliationEntry {
        ReconciliationEntry {
            occurred_at: Utc::now(),
            youtube_id: id.to_string(),
            youtube_url: format!("https://youtu.be/{}", id),
            blob_path: format!("videos/{}/run/{}.mp4", id, id),
            blob_location: format!("s3://videos/videos/{}/run/{}.mp4", id, id),
            transcription: "こんにちは".to_string(),
            translation: "Hello".to_string(),
            reason: "database is locked".to_string(),
        }
    }

    #[test]
    fn appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ReconciliationJournal::in_dir(&dir.path().join("outputs"));

        journal.append(&entry("a")).unwrap();
        journal.append(&entry("b")).unwrap();

        let entries = journal.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].youtube_id, "b");
        assert_eq!(entries[1].transcription, "こんにちは");
        assert_eq!(entries[1].translation, "Hello");
        assert_eq!(fs_err::read_to_string(journal.path()).unwrap().lines().count(), 2);
    }

    #[test]
    fn missing_journal_has_no_entries() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReconciliationJournal::in_dir(dir.path()).entries().unwrap().is_empty());
    }
}
