//! Song and verse operations.
//!
//! Songs are drafted unpublished with one pending generation job per verse.
//! Editing lyrics goes through [`reconcile`](crate::reconcile::reconcile) so
//! lightly edited or reordered verses keep their ids, illustrations and jobs.
//!
//! ## Lyric update transaction
//!
//! 1. Lock the song row (`FOR UPDATE`) and load its verses
//! 2. Delete removed verses (job and artifact cascade)
//! 3. Bump matched verses' sequence numbers out of the target range, then
//!    assign final positions and new text
//! 4. Insert new verses and enqueue their jobs
//! 5. Unpublish if anything substantive changed
//!
//! Every bulk statement checks its affected-row count. A mismatch means a
//! concurrent edit slipped in; the transaction is dropped and the caller gets
//! a retryable [`ServiceError::Conflict`].

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::PgConnection;
use tracing::info;
use uuid::Uuid;

use super::{Database, SongRow, VerseRow, SONG_COLUMNS, VERSE_COLUMNS};
use crate::error::ServiceError;
use crate::lyrics;
use crate::model::{Song, SongDetail, Verse};
use crate::reconcile::{self, ExistingVerse};

/// Added to matched verses' sequence numbers before final assignment so the
/// `(song_id, sequence_number)` unique constraint never sees a collision.
const SEQUENCE_BUMP: i32 = 1000;

/// Input for drafting a new song.
#[derive(Debug, Clone, Default)]
pub struct SongDraft {
    pub title: String,
    pub language: String,
    pub tags: Vec<String>,
    pub lyrics: String,
}

/// What a lyric edit did to a song.
#[derive(Debug, Clone, Serialize)]
pub struct LyricsUpdate {
    pub song_id: Uuid,
    pub matched: usize,
    pub significant: usize,
    pub inserted: usize,
    pub removed: usize,
    /// True when the edit flipped a published song back to unpublished.
    pub unpublished: bool,
    pub inserted_verse_ids: Vec<Uuid>,
}

fn conflict() -> anyhow::Error {
    ServiceError::Conflict("Song verses changed while saving. Reload and try again.".to_string())
        .into()
}

impl Database {
    /// Draft a new unpublished song, split into verses, with a pending job
    /// per verse. The slug is derived from the title and made unique.
    pub async fn create_song(&self, draft: &SongDraft) -> Result<SongDetail> {
        let title = lyrics::normalize_title(&draft.title)?;
        let language = lyrics::normalize_language(&draft.language)?;
        let tags = lyrics::normalize_tags(&draft.tags);
        let verse_texts = lyrics::require_verses(&draft.lyrics)?;
        let base_slug = lyrics::slugify(&title);

        let mut tx = self.pool.begin().await?;

        let taken: Vec<String> = sqlx::query_scalar(
            "SELECT slug FROM songs WHERE slug = $1 OR slug LIKE $1 || '-%'",
        )
        .bind(&base_slug)
        .fetch_all(&mut *tx)
        .await?;
        let slug = lyrics::unique_slug(&base_slug, &taken);

        let song = sqlx::query_as::<_, SongRow>(&format!(
            "INSERT INTO songs (slug, title, language, tags, is_published)
             VALUES ($1, $2, $3, $4, FALSE)
             RETURNING {SONG_COLUMNS}"
        ))
        .bind(&slug)
        .bind(&title)
        .bind(&language)
        .bind(&tags)
        .fetch_one(&mut *tx)
        .await?;

        let mut verses = Vec::with_capacity(verse_texts.len());
        for (i, text) in verse_texts.iter().enumerate() {
            let row = insert_verse_in(&mut tx, song.id, i as i32 + 1, text).await?;
            verses.push(Verse::from(row));
        }

        let targets: Vec<(Uuid, i32)> = verses.iter().map(|v| (v.id, v.sequence_number)).collect();
        super::jobs::enqueue_in(&mut tx, song.id, &targets).await?;
        tx.commit().await?;

        info!(
            song = %slug,
            verses = verses.len(),
            "Drafted song"
        );
        Ok(SongDetail {
            song: Song::from(song),
            verses,
        })
    }

    /// Get a song with its verses by slug (published or not).
    pub async fn get_song_detail_by_slug(&self, slug: &str) -> Result<Option<SongDetail>> {
        let mut conn = self.pool.acquire().await?;
        let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM songs WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&mut *conn)
            .await?;
        match id {
            Some(id) => song_detail_in(&mut conn, id).await,
            None => Ok(None),
        }
    }

    /// Get a song with its verses by ID.
    pub async fn get_song_detail(&self, song_id: Uuid) -> Result<Option<SongDetail>> {
        let mut conn = self.pool.acquire().await?;
        song_detail_in(&mut conn, song_id).await
    }

    /// Get a published song by slug, as end users see it.
    pub async fn get_published_song(&self, slug: &str) -> Result<Option<SongDetail>> {
        Ok(self
            .get_song_detail_by_slug(slug)
            .await?
            .filter(|d| d.song.is_published))
    }

    /// List songs with verses, most recently updated first.
    pub async fn list_songs(&self, published_only: bool, limit: i64) -> Result<Vec<SongDetail>> {
        let songs = sqlx::query_as::<_, SongRow>(&format!(
            "SELECT {SONG_COLUMNS} FROM songs
             WHERE ($1 = FALSE OR is_published = TRUE)
             ORDER BY updated_at DESC, slug ASC
             LIMIT $2"
        ))
        .bind(published_only)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = songs.iter().map(|s| s.id).collect();
        let verse_rows = sqlx::query_as::<_, VerseRow>(&format!(
            "SELECT {VERSE_COLUMNS} FROM verses
             WHERE song_id = ANY($1)
             ORDER BY song_id, sequence_number ASC"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut details: Vec<SongDetail> = songs
            .into_iter()
            .map(|s| SongDetail {
                song: Song::from(s),
                verses: Vec::new(),
            })
            .collect();
        for row in verse_rows {
            if let Some(detail) = details.iter_mut().find(|d| d.song.id == row.song_id) {
                detail.verses.push(Verse::from(row));
            }
        }
        Ok(details)
    }

    /// Publish or unpublish a song.
    pub async fn set_published(&self, slug: &str, published: bool) -> Result<Song> {
        let row = sqlx::query_as::<_, SongRow>(&format!(
            "UPDATE songs SET is_published = $2, updated_at = NOW()
             WHERE slug = $1
             RETURNING {SONG_COLUMNS}"
        ))
        .bind(slug)
        .bind(published)
        .fetch_optional(&self.pool)
        .await?;
        let row = row.ok_or_else(|| ServiceError::SongNotFound(slug.to_string()))?;
        info!(song = %slug, published, "Changed publication");
        Ok(Song::from(row))
    }

    /// Remember the provider conversation a song's illustrations belong to.
    pub async fn set_conversation_id(&self, song_id: Uuid, conversation_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE songs SET generation_conversation_id = $2 WHERE id = $1",
        )
        .bind(song_id)
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace a song's lyrics, reconciling new verses against existing ones.
    pub async fn update_song_lyrics(&self, slug: &str, lyrics_text: &str) -> Result<LyricsUpdate> {
        let next = lyrics::require_verses(lyrics_text)?;

        let mut tx = self.pool.begin().await?;
        let song: Option<(Uuid, bool)> = sqlx::query_as(
            "SELECT id, is_published FROM songs WHERE slug = $1 FOR UPDATE",
        )
        .bind(slug)
        .fetch_optional(&mut *tx)
        .await?;
        let (song_id, was_published) =
            song.ok_or_else(|| ServiceError::SongNotFound(slug.to_string()))?;

        let previous: Vec<Verse> = load_verses_in(&mut tx, song_id).await?;
        if previous.is_empty() {
            return Err(ServiceError::Validation(
                "Song has no existing verses to update.".to_string(),
            )
            .into());
        }

        let existing: Vec<ExistingVerse> = previous.iter().map(ExistingVerse::from).collect();
        let plan = reconcile::reconcile(&existing, &next);

        if !plan.removed_verse_ids.is_empty() {
            let deleted = sqlx::query("DELETE FROM verses WHERE song_id = $1 AND id = ANY($2)")
                .bind(song_id)
                .bind(&plan.removed_verse_ids)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if deleted != plan.removed_verse_ids.len() as u64 {
                return Err(conflict());
            }
        }

        if !plan.matches.is_empty() {
            let matched_ids: Vec<Uuid> = plan.matches.iter().map(|m| previous[m.old_index].id).collect();
            let max_existing = previous
                .iter()
                .map(|v| v.sequence_number)
                .max()
                .unwrap_or(0);
            let bump = SEQUENCE_BUMP + max_existing.max(next.len() as i32);
            let bumped = sqlx::query(
                "UPDATE verses SET sequence_number = sequence_number + $3
                 WHERE song_id = $1 AND id = ANY($2)",
            )
            .bind(song_id)
            .bind(&matched_ids)
            .bind(bump)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if bumped != matched_ids.len() as u64 {
                return Err(conflict());
            }

            for m in &plan.matches {
                let updated = sqlx::query(
                    "UPDATE verses SET sequence_number = $3, lyric_text = $4, updated_at = NOW()
                     WHERE song_id = $1 AND id = $2",
                )
                .bind(song_id)
                .bind(previous[m.old_index].id)
                .bind(m.new_index as i32 + 1)
                .bind(&next[m.new_index])
                .execute(&mut *tx)
                .await?
                .rows_affected();
                if updated != 1 {
                    return Err(conflict());
                }
            }
        }

        let mut inserted = Vec::with_capacity(plan.new_verse_indexes.len());
        for &idx in &plan.new_verse_indexes {
            let row = insert_verse_in(&mut tx, song_id, idx as i32 + 1, &next[idx]).await?;
            inserted.push((row.id, row.sequence_number));
        }
        super::jobs::enqueue_in(&mut tx, song_id, &inserted).await?;

        let should_unpublish = plan.should_unpublish();
        sqlx::query(
            "UPDATE songs SET
                is_published = CASE WHEN $2 THEN FALSE ELSE is_published END,
                updated_at = NOW()
             WHERE id = $1",
        )
        .bind(song_id)
        .bind(should_unpublish)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let update = LyricsUpdate {
            song_id,
            matched: plan.matches.len(),
            significant: plan.significant_matches().count(),
            inserted: inserted.len(),
            removed: plan.removed_verse_ids.len(),
            unpublished: was_published && should_unpublish,
            inserted_verse_ids: inserted.iter().map(|&(id, _)| id).collect(),
        };
        info!(
            song = %slug,
            matched = update.matched,
            significant = update.significant,
            inserted = update.inserted,
            removed = update.removed,
            unpublished = update.unpublished,
            "Reconciled lyrics"
        );
        Ok(update)
    }
}

/// Load a song and its ordered verses on an open connection.
pub(super) async fn song_detail_in(
    conn: &mut PgConnection,
    song_id: Uuid,
) -> Result<Option<SongDetail>> {
    let song = sqlx::query_as::<_, SongRow>(&format!(
        "SELECT {SONG_COLUMNS} FROM songs WHERE id = $1"
    ))
    .bind(song_id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(song) = song else {
        return Ok(None);
    };
    let verses = load_verses_in(conn, song_id).await?;
    Ok(Some(SongDetail {
        song: Song::from(song),
        verses,
    }))
}

async fn load_verses_in(conn: &mut PgConnection, song_id: Uuid) -> Result<Vec<Verse>> {
    let rows = sqlx::query_as::<_, VerseRow>(&format!(
        "SELECT {VERSE_COLUMNS} FROM verses WHERE song_id = $1 ORDER BY sequence_number ASC"
    ))
    .bind(song_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(Verse::from).collect())
}

async fn insert_verse_in(
    conn: &mut PgConnection,
    song_id: Uuid,
    sequence_number: i32,
    text: &str,
) -> Result<VerseRow> {
    sqlx::query_as::<_, VerseRow>(&format!(
        "INSERT INTO verses (song_id, sequence_number, lyric_text, illustration_url)
         VALUES ($1, $2, $3, NULL)
         RETURNING {VERSE_COLUMNS}"
    ))
    .bind(song_id)
    .bind(sequence_number)
    .bind(text)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("failed to insert verse {}", sequence_number))
}
