//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::OnceCell;
use versecraft::db::{Database, SongDraft};
use versecraft::model::SongDetail;
use versecraft::provider::{GeneratedImage, GenerationRequest, ImageProvider};

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// One-time schema initialization.
static SCHEMA_INIT: OnceCell<()> = OnceCell::const_new();

/// Ensure the test database schema is set up (runs migrations once per test binary).
pub async fn ensure_schema() {
    SCHEMA_INIT
        .get_or_init(|| async {
            let pool = sqlx::PgPool::connect(&test_db_url()).await.unwrap();
            run_migrations(&pool).await;
            pool.close().await;
        })
        .await;
}

/// Connect to the test database with a clean slate.
pub async fn setup_test_db() -> Database {
    ensure_schema().await;
    let db = Database::connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    truncate_all_tables(db.pool()).await;
    db
}

/// Truncate all tables to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql("TRUNCATE TABLE verse_artifacts, generation_jobs, verses, songs CASCADE")
        .execute(pool)
        .await
        .unwrap();
}

async fn run_migrations(pool: &sqlx::PgPool) {
    let migration_files = ["migrations/001_initial.sql"];

    for file in &migration_files {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(file);
        if !path.exists() {
            panic!("Migration file not found: {}", file);
        }
        let sql = std::fs::read_to_string(&path).unwrap();
        sqlx::raw_sql(&sql).execute(pool).await.unwrap_or_else(|e| {
            panic!("Migration {} failed: {}", file, e);
        });
    }
}

/// Draft a song with default language and no tags.
pub async fn draft(db: &Database, title: &str, lyrics: &str) -> SongDetail {
    db.create_song(&SongDraft {
        title: title.to_string(),
        language: "en".to_string(),
        tags: vec![],
        lyrics: lyrics.to_string(),
    })
    .await
    .unwrap()
}

// ── Mock provider ───────────────────────────────────────────────

/// What a [`MockProvider`] saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub continuity_len: usize,
    pub continuity_notes: Vec<Option<String>>,
}

/// Provider that returns fixed bytes, or fails, and records every request.
#[derive(Clone, Default)]
pub struct MockProvider {
    pub fail_with: Option<String>,
    pub summary: Option<String>,
    pub conversation_id: Option<String>,
    pub calls: Arc<std::sync::Mutex<Vec<RecordedCall>>>,
    pub count: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn succeeding(summary: &str) -> Self {
        MockProvider {
            summary: Some(summary.to_string()),
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        MockProvider {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl ImageProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> impl Future<Output = Result<GeneratedImage>> + Send {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(RecordedCall {
            prompt: request.prompt.to_string(),
            continuity_len: request.continuity.len(),
            continuity_notes: request
                .continuity
                .iter()
                .map(|t| t.illustration_note.clone())
                .collect(),
        });
        let result = match &self.fail_with {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(GeneratedImage {
                bytes: b"mock-image".to_vec(),
                summary: self.summary.clone(),
                conversation_id: self.conversation_id.clone(),
            }),
        };
        async move { result }
    }
}
