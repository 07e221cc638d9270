//! SQLite-backed record store.
//!
//! Queries go through sqlx's `Executor` so the same statements run against the pool or inside a
//! transaction.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use super::{
    NewProcessingLog, NewVideoRecord, ProcessingLog, RecordQuery, RecordStore, StorageError,
    StorageResult, Tag, VideoRecord,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS videos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        youtube_url TEXT NOT NULL,
        youtube_id TEXT NOT NULL UNIQUE,
        video_path TEXT NOT NULL,
        transcription TEXT NOT NULL,
        translation TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS video_tags (
        video_id INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        PRIMARY KEY (video_id, tag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS processing_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
        stage TEXT NOT NULL,
        status TEXT NOT NULL,
        message TEXT,
        duration_ms INTEGER,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_videos_created_at ON videos(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_processing_logs_video ON processing_logs(video_id)",
];

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Connect and make sure the schema exists
    pub async fn connect(url: &str, max_connections: u32) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to :memory: is its own database, so keep exactly one alive
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        }
        .connect_with(options)
        .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Single-connection in-memory store
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn migrate(&self) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn map_insert_error(err: sqlx::Error, youtube_id: &str) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StorageError::UniqueViolation(format!("youtube_id {}", youtube_id));
        }
    }
    StorageError::Database(err)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_video(&self, record: &NewVideoRecord) -> StorageResult<VideoRecord> {
        sqlx::query_as::<_, VideoRecord>(
            r#"
            INSERT INTO videos (youtube_url, youtube_id, video_path, transcription, translation, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id, youtube_url, youtube_id, video_path, transcription, translation, created_at
            "#,
        )
        .bind(&record.youtube_url)
        .bind(&record.youtube_id)
        .bind(&record.video_storage_path)
        .bind(&record.transcription)
        .bind(&record.translation)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &record.youtube_id))
    }

    async fn find_by_youtube_id(&self, youtube_id: &str) -> StorageResult<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>(
            r#"
            SELECT id, youtube_url, youtube_id, video_path, transcription, translation, created_at
            FROM videos
            WHERE youtube_id = ?1
            "#,
        )
        .bind(youtube_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_videos(&self, query: &RecordQuery) -> StorageResult<Vec<VideoRecord>> {
        // A negative LIMIT means no limit in SQLite
        let limit = query.limit.filter(|l| *l >= 0).unwrap_or(-1);

        let records = sqlx::query_as::<_, VideoRecord>(
            r#"
            SELECT v.id, v.youtube_url, v.youtube_id, v.video_path, v.transcription, v.translation, v.created_at
            FROM videos v
            WHERE (?1 IS NULL OR v.youtube_id = ?1)
              AND (?2 IS NULL OR v.created_at >= ?2)
              AND (?3 IS NULL OR EXISTS (
                    SELECT 1 FROM video_tags vt
                    JOIN tags t ON t.id = vt.tag_id
                    WHERE vt.video_id = v.id AND t.name = ?3
              ))
            ORDER BY v.created_at DESC, v.id DESC
            LIMIT ?4
            "#,
        )
        .bind(query.youtube_id.as_deref())
        .bind(query.created_after)
        .bind(query.tag.as_deref())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn count_videos(&self) -> StorageResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM videos")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn tags_for_video(&self, video_id: i64) -> StorageResult<Vec<String>> {
        let names: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT t.name FROM video_tags vt
            JOIN tags t ON t.id = vt.tag_id
            WHERE vt.video_id = ?1
            ORDER BY t.name
            "#,
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names.into_iter().map(|(name,)| name).collect())
    }

    async fn list_tags(&self) -> StorageResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(tags)
    }

    async fn tag_video(&self, video_id: i64, name: &str) -> StorageResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StorageError::Invalid("tag name must not be empty".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?1)")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        let (tag_id,): (i64,) = sqlx::query_as("SELECT id FROM tags WHERE name = ?1")
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;

        let result = sqlx::query("INSERT OR IGNORE INTO video_tags (video_id, tag_id) VALUES (?1, ?2)")
            .bind(video_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                return Err(StorageError::NotFound(format!("video {}", video_id)));
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(())
    }

    async fn append_log(&self, entry: &NewProcessingLog) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO processing_logs (video_id, stage, status, message, duration_ms, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(entry.video_id)
        .bind(&entry.stage)
        .bind(&entry.status)
        .bind(entry.message.as_deref())
        .bind(entry.duration_ms)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn logs_for_video(&self, video_id: i64) -> StorageResult<Vec<ProcessingLog>> {
        let logs = sqlx::query_as::<_, ProcessingLog>(
            r#"
            SELECT id, video_id, stage, status, message, duration_ms, created_at
            FROM processing_logs
            WHERE video_id = ?1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(youtube_id: &str) -> NewVideoRecord {
        NewVideoRecord {
            youtube_url: format!("https://www.youtube.com/watch?v={}", youtube_id),
            youtube_id: youtube_id.to_string(),
            video_storage_path: format!("videos/{}/run/{}.mp4", youtube_id, youtube_id),
            transcription: "こんにちは".to_string(),
            translation: "Hello".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_find() {
        let store = SqliteRecordStore::in_memory().await.unwrap();

        let record = store.insert_video(&new_record("abc")).await.unwrap();
        assert_eq!(record.youtube_id, "abc");
        assert_eq!(record.translation, "Hello");

        let found = store.find_by_youtube_id("abc").await.unwrap().unwrap();
        assert_eq!(found, record);
        assert!(store.find_by_youtube_id("missing").await.unwrap().is_none());
        assert_eq!(store.count_videos().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_youtube_id_is_a_unique_violation() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        store.insert_video(&new_record("abc")).await.unwrap();

        let err = store.insert_video(&new_record("abc")).await.unwrap_err();
        assert!(matches!(err, StorageError::UniqueViolation(_)));
        assert_eq!(store.count_videos().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_filters_and_limits() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        let first = store.insert_video(&new_record("one")).await.unwrap();
        store.insert_video(&new_record("two")).await.unwrap();
        store.insert_video(&new_record("three")).await.unwrap();

        let all = store.list_videos(&RecordQuery::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].youtube_id, "three");

        let limited = store
            .list_videos(&RecordQuery { limit: Some(2), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        store.tag_video(first.id, "news").await.unwrap();
        let tagged = store
            .list_videos(&RecordQuery { tag: Some("news".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].youtube_id, "one");

        let by_id = store
            .list_videos(&RecordQuery { youtube_id: Some("two".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(by_id.len(), 1);
    }

    #[tokio::test]
    async fn tags_and_logs_hang_off_the_record() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        let record = store.insert_video(&new_record("abc")).await.unwrap();

        store.tag_video(record.id, "music").await.unwrap();
        store.tag_video(record.id, "japanese").await.unwrap();
        store.tag_video(record.id, "music").await.unwrap();

        assert_eq!(
            store.tags_for_video(record.id).await.unwrap(),
            vec!["japanese".to_string(), "music".to_string()]
        );
        assert_eq!(store.list_tags().await.unwrap().len(), 2);

        store
            .append_log(&NewProcessingLog {
                video_id: record.id,
                stage: "transcribing".into(),
                status: "completed".into(),
                message: None,
                duration_ms: Some(1200),
            })
            .await
            .unwrap();

        let logs = store.logs_for_video(record.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].stage, "transcribing");
        assert_eq!(logs[0].duration_ms, Some(1200));
    }

    #[tokio::test]
    async fn tagging_unknown_video_fails() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        let err = store.tag_video(42, "news").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
