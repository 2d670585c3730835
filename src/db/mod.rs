//! # Database — PostgreSQL Storage Layer
//!
//! Async operations over `sqlx::PgPool` for songs, verses, generation jobs,
//! and verse artifacts. The [`Database`] handle is cloned into whatever
//! needs storage; there is no global connection.
//!
//! ## Schema
//!
//! - `songs`: slug, title, language, publication flag, tags
//! - `verses`: per-song lyric stanzas, unique `(song_id, sequence_number)`
//! - `generation_jobs`: one row per verse (unique `verse_id`), status machine
//! - `verse_artifacts`: latest successful generation per verse (unique `verse_id`)
//!
//! Deleting a verse cascades to its job and artifact.
//!
//! ## Module Structure
//!
//! - [`songs`]: drafting, lookup, publication, lyric reconciliation
//! - [`jobs`]: the generation queue (enqueue, claim, complete, fail, reset, list)
//! - [`artifacts`]: artifact upsert and lookup, completion with artifact
//!
//! ## Transactions
//!
//! Every read-then-write operation runs in a single transaction opened with
//! `pool.begin()`. A transaction dropped without `commit()` rolls back, so an
//! early `?` return never leaves partial state behind.

mod artifacts;
mod jobs;
mod songs;

pub use songs::{LyricsUpdate, SongDraft};

use anyhow::Result;
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use uuid::Uuid;

// ── Row types ───────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub struct SongRow {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub language: String,
    pub is_published: bool,
    pub tags: Vec<String>,
    pub generation_conversation_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct VerseRow {
    pub id: Uuid,
    pub song_id: Uuid,
    pub sequence_number: i32,
    pub lyric_text: String,
    pub illustration_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub song_id: Uuid,
    pub verse_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub additional_prompt_direction: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Job joined with the song/verse context shown to operators.
#[derive(Debug, sqlx::FromRow)]
pub struct JobListRow {
    pub id: Uuid,
    pub song_id: Uuid,
    pub verse_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub additional_prompt_direction: Option<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub song_title: String,
    pub song_slug: String,
    pub song_is_published: bool,
    pub sequence_number: i32,
    pub lyric_text: String,
    pub illustration_url: Option<String>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ArtifactRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub verse_id: Uuid,
    pub prompt: String,
    pub provider: String,
    pub model: String,
    pub image_url: String,
    pub storage_path: String,
    pub thumbnail_path: Option<String>,
    pub thumbnail_url: Option<String>,
    pub image_summary: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Queue depth by status, for operator visibility.
#[derive(Debug, Default, Serialize, sqlx::FromRow)]
pub struct JobStatusCounts {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
}

pub(crate) const SONG_COLUMNS: &str = "id, slug, title, language, is_published, tags,
    generation_conversation_id, created_at, updated_at";

pub(crate) const VERSE_COLUMNS: &str =
    "id, song_id, sequence_number, lyric_text, illustration_url, created_at, updated_at";

pub(crate) const JOB_COLUMNS: &str = "id, song_id, verse_id, status, attempts,
    additional_prompt_direction, started_at, completed_at, last_error, created_at, updated_at";

pub(crate) const ARTIFACT_COLUMNS: &str = "id, job_id, verse_id, prompt, provider, model,
    image_url, storage_path, thumbnail_path, thumbnail_url, image_summary, created_at, updated_at";

// ── Database struct and connection ──────────────────────────────

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// Parses the URL by hand so percent-encoded usernames and passwords
    /// (including pooler suffixes like `user.project-ref`) survive intact.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with_max(database_url, 4).await
    }

    pub async fn connect_with_max(database_url: &str, max_connections: u32) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username)
            .statement_cache_capacity(0);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
