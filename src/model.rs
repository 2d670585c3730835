//! Domain entities and transfer shapes.
//!
//! Three tiers, mapped by plain conversion functions:
//!
//! - storage rows (`crate::db::*Row`, `sqlx::FromRow`) mirror table columns,
//! - domain entities here carry parsed types (`JobStatus`, `Uuid`),
//! - transfer shapes (`JobListEntry`, `SongSummary`) are what the operator
//!   surface serializes.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{ArtifactRow, JobListRow, JobRow, SongRow, VerseRow};
use crate::reconcile::ExistingVerse;

// ── Songs and verses ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Song {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub language: String,
    pub is_published: bool,
    pub tags: Vec<String>,
    pub generation_conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SongRow> for Song {
    fn from(row: SongRow) -> Self {
        Song {
            id: row.id,
            slug: row.slug,
            title: row.title,
            language: row.language,
            is_published: row.is_published,
            tags: row.tags,
            generation_conversation_id: row.generation_conversation_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Verse {
    pub id: Uuid,
    pub song_id: Uuid,
    pub sequence_number: i32,
    pub lyric_text: String,
    /// `None` until an illustration has been generated.
    pub illustration_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<VerseRow> for Verse {
    fn from(row: VerseRow) -> Self {
        Verse {
            id: row.id,
            song_id: row.song_id,
            sequence_number: row.sequence_number,
            lyric_text: row.lyric_text,
            illustration_url: row.illustration_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<&Verse> for ExistingVerse {
    fn from(verse: &Verse) -> Self {
        ExistingVerse {
            id: verse.id,
            lyric_text: verse.lyric_text.clone(),
        }
    }
}

/// A song with its verses in sequence order.
#[derive(Debug, Clone, Serialize)]
pub struct SongDetail {
    pub song: Song,
    pub verses: Vec<Verse>,
}

impl SongDetail {
    pub fn first_verse(&self) -> Option<&Verse> {
        self.verses.iter().min_by_key(|v| v.sequence_number)
    }

    /// Full lyric text, verses joined by blank lines.
    pub fn lyrics(&self) -> String {
        self.verses
            .iter()
            .map(|v| v.lyric_text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// ── Generation jobs ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(anyhow!("unknown job status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationJob {
    pub id: Uuid,
    pub song_id: Uuid,
    pub verse_id: Uuid,
    pub status: JobStatus,
    pub attempts: i32,
    pub additional_prompt_direction: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for GenerationJob {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(GenerationJob {
            id: row.id,
            song_id: row.song_id,
            verse_id: row.verse_id,
            status: row.status.parse()?,
            attempts: row.attempts,
            additional_prompt_direction: row.additional_prompt_direction,
            started_at: row.started_at,
            completed_at: row.completed_at,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Everything a worker needs to build a prompt for the job it just claimed.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: GenerationJob,
    pub song: SongDetail,
    pub verse: Verse,
}

/// How `reset` should treat the job's additional prompt direction.
///
/// Absent, explicit-null, and a value are three different requests, so this
/// is not an `Option<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DirectionUpdate {
    /// Leave the stored direction untouched.
    #[default]
    Keep,
    /// Remove any stored direction.
    Clear,
    /// Replace the direction with this trimmed, non-empty text.
    Set(String),
}

impl DirectionUpdate {
    /// Build from an optional-of-optional request value. Blank strings clear.
    pub fn from_request(value: Option<Option<&str>>) -> Self {
        match value {
            None => DirectionUpdate::Keep,
            Some(None) => DirectionUpdate::Clear,
            Some(Some(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    DirectionUpdate::Clear
                } else {
                    DirectionUpdate::Set(text.to_string())
                }
            }
        }
    }

    /// `(should_update, new_value)` bind pair for SQL.
    pub(crate) fn as_binds(&self) -> (bool, Option<&str>) {
        match self {
            DirectionUpdate::Keep => (false, None),
            DirectionUpdate::Clear => (true, None),
            DirectionUpdate::Set(text) => (true, Some(text.as_str())),
        }
    }
}

/// Result of resetting a job: the job as it now stands plus blob paths of
/// the deleted artifact that nothing references any more.
#[derive(Debug, Clone)]
pub struct ResetOutcome {
    pub job: GenerationJob,
    pub orphaned_paths: Vec<String>,
}

// ── Artifacts ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct VerseArtifact {
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ArtifactRow> for VerseArtifact {
    fn from(row: ArtifactRow) -> Self {
        VerseArtifact {
            id: row.id,
            job_id: row.job_id,
            verse_id: row.verse_id,
            prompt: row.prompt,
            provider: row.provider,
            model: row.model,
            image_url: row.image_url,
            storage_path: row.storage_path,
            thumbnail_path: row.thumbnail_path,
            thumbnail_url: row.thumbnail_url,
            image_summary: row.image_summary,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Artifact fields produced by a successful generation, before storage.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub prompt: String,
    pub provider: String,
    pub model: String,
    pub image_url: String,
    pub storage_path: String,
    pub thumbnail_path: Option<String>,
    pub thumbnail_url: Option<String>,
    pub image_summary: Option<String>,
}

// ── Job listing ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListFilter {
    pub limit: i64,
    #[serde(default)]
    pub exclude_published: bool,
    pub search: Option<String>,
}

impl JobListFilter {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 500;

    /// Clamp the limit into `1..=MAX_LIMIT`, treating 0 as the default.
    pub(crate) fn effective_limit(&self) -> i64 {
        match self.limit {
            0 => Self::DEFAULT_LIMIT,
            n => n.clamp(1, Self::MAX_LIMIT),
        }
    }

    /// `ILIKE` pattern for the search text, or `None` when blank.
    pub(crate) fn search_pattern(&self) -> Option<String> {
        let text = self.search.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        let escaped = text
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        Some(format!("%{}%", escaped))
    }
}

/// One row of the operator job list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListEntry {
    pub id: Uuid,
    pub song_id: Uuid,
    pub verse_id: Uuid,
    pub status: JobStatus,
    pub attempts: i32,
    pub additional_prompt_direction: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub song_title: String,
    pub song_slug: String,
    pub song_is_published: bool,
    pub sequence_number: i32,
    pub lyric_text: String,
    pub illustration_url: Option<String>,
    pub conversation_id: Option<String>,
}

impl TryFrom<JobListRow> for JobListEntry {
    type Error = anyhow::Error;

    fn try_from(row: JobListRow) -> Result<Self> {
        Ok(JobListEntry {
            id: row.id,
            song_id: row.song_id,
            verse_id: row.verse_id,
            status: row.status.parse()?,
            attempts: row.attempts,
            additional_prompt_direction: row.additional_prompt_direction,
            started_at: row.started_at,
            completed_at: row.completed_at,
            last_error: row.last_error,
            created_at: row.created_at,
            song_title: row.song_title,
            song_slug: row.song_slug,
            song_is_published: row.song_is_published,
            sequence_number: row.sequence_number,
            lyric_text: row.lyric_text,
            illustration_url: row.illustration_url,
            conversation_id: row.conversation_id,
        })
    }
}

/// Public listing shape for a song.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongSummary {
    pub slug: String,
    pub title: String,
    pub language: String,
    pub tags: Vec<String>,
    pub is_published: bool,
    pub verse_count: usize,
    pub illustrated_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&SongDetail> for SongSummary {
    fn from(detail: &SongDetail) -> Self {
        SongSummary {
            slug: detail.song.slug.clone(),
            title: detail.song.title.clone(),
            language: detail.song.language.clone(),
            tags: detail.song.tags.clone(),
            is_published: detail.song.is_published,
            verse_count: detail.verses.len(),
            illustrated_count: detail
                .verses
                .iter()
                .filter(|v| v.illustration_url.is_some())
                .count(),
            updated_at: detail.song.updated_at,
        }
    }
}
