//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Each function opens
//! its own runtime and database connection, runs one operation, and prints
//! the result as JSON on stdout.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;
use versecraft::config::{self, Config};
use versecraft::db::{Database, SongDraft};
use versecraft::generation::Runner;
use versecraft::model::{DirectionUpdate, JobListFilter, SongSummary};
use versecraft::provider::AnyProvider;
use versecraft::storage::{IllustrationStore, LocalStore};
use versecraft::ServiceError;

use super::Cli;

// ── Shared plumbing ─────────────────────────────────────────────

fn connect(cli: &Cli) -> Result<(tokio::runtime::Runtime, Database)> {
    let database_url = cli.database_url.as_deref().ok_or_else(|| {
        anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)")
    })?;
    let rt = tokio::runtime::Runtime::new()?;
    let database = rt.block_on(Database::connect(database_url))?;
    Ok((rt, database))
}

fn load_config(cli: &Cli) -> Result<Config> {
    config::load(cli.config.as_deref())
}

fn local_store(config: &Config) -> LocalStore {
    LocalStore::new(&config.storage.dir, &config.storage.public_base_url)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read lyrics from a file, or stdin when the path is `-`.
fn read_lyrics(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read lyrics from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read lyrics from {}", path.display()))
}

// ── Songs ───────────────────────────────────────────────────────

pub fn run_draft(
    cli: &Cli,
    title: &str,
    language: &str,
    tags: &[String],
    lyrics_path: &Path,
) -> Result<()> {
    let draft = SongDraft {
        title: title.to_string(),
        language: language.to_string(),
        tags: tags.to_vec(),
        lyrics: read_lyrics(lyrics_path)?,
    };
    let (rt, database) = connect(cli)?;
    let detail = rt.block_on(database.create_song(&draft))?;
    print_json(&detail)
}

pub fn run_edit_lyrics(cli: &Cli, slug: &str, lyrics_path: &Path) -> Result<()> {
    let lyrics = read_lyrics(lyrics_path)?;
    let (rt, database) = connect(cli)?;
    let update = rt.block_on(database.update_song_lyrics(slug, &lyrics))?;
    print_json(&update)
}

pub fn run_set_published(cli: &Cli, slug: &str, published: bool) -> Result<()> {
    let (rt, database) = connect(cli)?;
    let song = rt.block_on(database.set_published(slug, published))?;
    info!(song = %song.slug, published, "Publication changed");
    print_json(&song)
}

pub fn run_songs(cli: &Cli, published_only: bool, limit: i64) -> Result<()> {
    let (rt, database) = connect(cli)?;
    let songs = rt.block_on(database.list_songs(published_only, limit))?;
    let summaries: Vec<SongSummary> = songs.iter().map(SongSummary::from).collect();
    print_json(&summaries)
}

#[derive(Serialize)]
struct SongView<'a> {
    #[serde(flatten)]
    detail: &'a versecraft::model::SongDetail,
    artifacts: Vec<versecraft::model::VerseArtifact>,
}

pub fn run_show(cli: &Cli, slug: &str) -> Result<()> {
    let (rt, database) = connect(cli)?;
    let detail = rt
        .block_on(database.get_song_detail_by_slug(slug))?
        .ok_or_else(|| ServiceError::SongNotFound(slug.to_string()))?;
    let artifacts = rt.block_on(database.list_artifacts_for_song(detail.song.id))?;
    print_json(&SongView {
        detail: &detail,
        artifacts,
    })
}

// ── Generation jobs ─────────────────────────────────────────────

pub fn run_work(cli: &Cli, limit: u32) -> Result<()> {
    let config = load_config(cli)?;
    let provider = AnyProvider::from_config(&config.generation)?;
    let store = local_store(&config);
    let (rt, database) = connect(cli)?;

    info!(
        provider = %config.generation.provider,
        model = %config.generation.model,
        limit,
        "Starting generation run"
    );
    let runner = Runner::new(database, provider, store, config.generation.clone());
    let summary = rt.block_on(runner.process_jobs(limit))?;
    print_json(&summary)
}

pub fn run_jobs(
    cli: &Cli,
    limit: i64,
    exclude_published: bool,
    search: Option<&str>,
) -> Result<()> {
    let filter = JobListFilter {
        limit,
        exclude_published,
        search: search.map(str::to_string),
    };
    let (rt, database) = connect(cli)?;
    let jobs = rt.block_on(database.list_jobs(&filter))?;
    print_json(&jobs)
}

pub fn run_job_stats(cli: &Cli) -> Result<()> {
    let (rt, database) = connect(cli)?;
    let counts = rt.block_on(database.job_status_counts())?;
    print_json(&counts)
}

pub fn run_reset_job(
    cli: &Cli,
    job_id: Uuid,
    direction: Option<&str>,
    clear_direction: bool,
) -> Result<()> {
    let update = if clear_direction {
        DirectionUpdate::Clear
    } else {
        DirectionUpdate::from_request(direction.map(Some))
    };
    let config = load_config(cli)?;
    let store = local_store(&config);
    let (rt, database) = connect(cli)?;

    let outcome = rt
        .block_on(database.reset_job(job_id, &update))?
        .ok_or(ServiceError::JobNotFound(job_id))?;

    rt.block_on(async {
        for path in &outcome.orphaned_paths {
            if let Err(e) = store.delete(path).await {
                warn!(job_id = %job_id, path = %path, error = %e, "Failed to delete orphaned illustration");
            }
        }
    });
    print_json(&outcome.job)
}

// ── Configuration ───────────────────────────────────────────────

pub fn run_config(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    print_json(&config)
}
