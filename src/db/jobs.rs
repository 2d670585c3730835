//! Generation job queue.
//!
//! One job row per verse (unique `verse_id`). Workers claim jobs with
//! `FOR UPDATE SKIP LOCKED`, so concurrent claimants never receive the same
//! row and never block one another.
//!
//! ## Lifecycle
//!
//! ```text
//! pending ──claim──▶ in_progress ──complete──▶ completed
//!    ▲                    │
//!    │                    └──fail──▶ failed
//!    └────────reset───────────────────┘ (from any state)
//! ```
//!
//! 1. `enqueue_jobs` inserts `pending` rows, ignoring verses that already
//!    have a job, so re-running after a partial failure is safe
//! 2. `claim_next_job` picks the oldest pending job (ties by verse order),
//!    bumps `attempts`, and returns the song context in the same transaction
//! 3. `mark_job_completed` / `mark_job_failed` settle the job; a missing job
//!    is a hard [`ServiceError::JobNotFound`]
//! 4. `reset_job` requeues, clears the verse illustration and deletes its
//!    artifact, returning the blob paths left orphaned
//!
//! There is no staleness timeout: a worker that dies mid-job leaves the row
//! `in_progress` until an operator resets it.

use anyhow::{anyhow, Result};
use sqlx::PgConnection;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Database, JobListRow, JobRow, JobStatusCounts, JOB_COLUMNS};
use crate::error::ServiceError;
use crate::model::{
    ClaimedJob, DirectionUpdate, GenerationJob, JobListEntry, JobListFilter, ResetOutcome, Verse,
};

impl Database {
    /// Enqueue a pending job for each verse, in ascending sequence order.
    /// Verses that already have a job are skipped. Returns the number of jobs
    /// actually inserted.
    pub async fn enqueue_jobs(&self, song_id: Uuid, verses: &[Verse]) -> Result<u64> {
        let targets: Vec<(Uuid, i32)> = verses
            .iter()
            .map(|v| (v.id, v.sequence_number))
            .collect();
        let mut tx = self.pool.begin().await?;
        let inserted = enqueue_in(&mut tx, song_id, &targets).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    /// Claim the next pending job, or `None` when the queue is empty.
    ///
    /// Selection, the status transition, and loading the song detail happen
    /// in one transaction. The row lock is released at commit; from then on
    /// the `in_progress` status is what keeps other workers away.
    pub async fn claim_next_job(&self) -> Result<Option<ClaimedJob>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, JobRow>(
            "WITH next_job AS (
                SELECT j.id FROM generation_jobs j
                JOIN verses v ON v.id = j.verse_id
                WHERE j.status = 'pending'
                ORDER BY j.created_at ASC, v.sequence_number ASC
                LIMIT 1
                FOR UPDATE OF j SKIP LOCKED
            )
            UPDATE generation_jobs SET
                status = 'in_progress',
                attempts = generation_jobs.attempts + 1,
                started_at = COALESCE(generation_jobs.started_at, NOW()),
                last_error = NULL,
                updated_at = NOW()
            FROM next_job
            WHERE generation_jobs.id = next_job.id
            RETURNING generation_jobs.id, generation_jobs.song_id, generation_jobs.verse_id,
                      generation_jobs.status, generation_jobs.attempts,
                      generation_jobs.additional_prompt_direction,
                      generation_jobs.started_at, generation_jobs.completed_at,
                      generation_jobs.last_error, generation_jobs.created_at,
                      generation_jobs.updated_at",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };
        let job = GenerationJob::try_from(row)?;

        let song = super::songs::song_detail_in(&mut tx, job.song_id)
            .await?
            .ok_or_else(|| anyhow!("song {} for job {} not found", job.song_id, job.id))?;
        if song.verses.is_empty() {
            return Err(ServiceError::NoVerses(job.song_id).into());
        }
        let verse = song
            .verses
            .iter()
            .find(|v| v.id == job.verse_id)
            .cloned()
            .ok_or_else(|| anyhow!("verse {} for job {} not found", job.verse_id, job.id))?;
        tx.commit().await?;

        info!(
            job_id = %job.id,
            song = %song.song.slug,
            verse = verse.sequence_number,
            attempts = job.attempts,
            "Claimed generation job"
        );
        Ok(Some(ClaimedJob { job, song, verse }))
    }

    /// Mark a job completed and clear its last error.
    pub async fn mark_job_completed(&self, job_id: Uuid) -> Result<GenerationJob> {
        let mut conn = self.pool.acquire().await?;
        mark_completed_in(&mut conn, job_id).await
    }

    /// Mark a job failed, recording the error message.
    pub async fn mark_job_failed(&self, job_id: Uuid, error: &str) -> Result<GenerationJob> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE generation_jobs SET
                status = 'failed', completed_at = NULL, last_error = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;
        let row = row.ok_or(ServiceError::JobNotFound(job_id))?;
        GenerationJob::try_from(row)
    }

    /// Send a job back to `pending`, discarding its illustration.
    ///
    /// Clears the job's timestamps and last error, applies `direction`
    /// (see [`DirectionUpdate`]), nulls the verse's `illustration_url` and
    /// deletes its artifact. Returns `None` if the job does not exist.
    pub async fn reset_job(
        &self,
        job_id: Uuid,
        direction: &DirectionUpdate,
    ) -> Result<Option<ResetOutcome>> {
        let (update_direction, direction_value) = direction.as_binds();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE generation_jobs SET
                status = 'pending',
                started_at = NULL,
                completed_at = NULL,
                last_error = NULL,
                additional_prompt_direction = CASE WHEN $2 THEN $3::TEXT
                                                   ELSE additional_prompt_direction END,
                updated_at = NOW()
             WHERE id = $1
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(update_direction)
        .bind(direction_value)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let job = GenerationJob::try_from(row)?;

        sqlx::query(
            "UPDATE verses SET illustration_url = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(job.verse_id)
        .execute(&mut *tx)
        .await?;

        let removed: Option<(String, Option<String>)> = sqlx::query_as(
            "DELETE FROM verse_artifacts WHERE verse_id = $1
             RETURNING storage_path, thumbnail_path",
        )
        .bind(job.verse_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        let orphaned_paths = match removed {
            Some((path, thumb)) => std::iter::once(path).chain(thumb).collect(),
            None => Vec::new(),
        };
        info!(
            job_id = %job.id,
            orphaned = orphaned_paths.len(),
            "Reset generation job"
        );
        Ok(Some(ResetOutcome {
            job,
            orphaned_paths,
        }))
    }

    /// Get a single job by ID.
    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<GenerationJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(GenerationJob::try_from).transpose()
    }

    /// Get the job for a verse, if one exists.
    pub async fn get_job_for_verse(&self, verse_id: Uuid) -> Result<Option<GenerationJob>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs WHERE verse_id = $1"
        ))
        .bind(verse_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(GenerationJob::try_from).transpose()
    }

    /// List jobs with song/verse context, newest first, verses in order.
    pub async fn list_jobs(&self, filter: &JobListFilter) -> Result<Vec<JobListEntry>> {
        let rows = sqlx::query_as::<_, JobListRow>(
            "SELECT j.id, j.song_id, j.verse_id, j.status, j.attempts,
                    j.additional_prompt_direction, j.started_at, j.completed_at,
                    j.last_error, j.created_at,
                    s.title AS song_title, s.slug AS song_slug,
                    s.is_published AS song_is_published,
                    v.sequence_number, v.lyric_text, v.illustration_url,
                    s.generation_conversation_id AS conversation_id
             FROM generation_jobs j
             JOIN songs s ON s.id = j.song_id
             JOIN verses v ON v.id = j.verse_id
             WHERE ($1 = FALSE OR s.is_published = FALSE)
               AND ($2::TEXT IS NULL
                    OR s.title ILIKE $2 OR s.slug ILIKE $2 OR v.lyric_text ILIKE $2)
             ORDER BY j.created_at DESC, v.sequence_number ASC
             LIMIT $3",
        )
        .bind(filter.exclude_published)
        .bind(filter.search_pattern())
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobListEntry::try_from).collect()
    }

    /// Count jobs by status across the whole queue.
    pub async fn job_status_counts(&self) -> Result<JobStatusCounts> {
        let row = sqlx::query_as::<_, JobStatusCounts>(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
             FROM generation_jobs",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}

/// Insert pending jobs for `(verse_id, sequence_number)` pairs on an open
/// connection, lowest sequence first. Existing jobs are left alone.
pub(super) async fn enqueue_in(
    conn: &mut PgConnection,
    song_id: Uuid,
    verses: &[(Uuid, i32)],
) -> Result<u64> {
    let mut ordered = verses.to_vec();
    ordered.sort_by_key(|&(_, seq)| seq);

    let mut inserted = 0;
    for (verse_id, seq) in ordered {
        let result = sqlx::query(
            "INSERT INTO generation_jobs (song_id, verse_id, status)
             VALUES ($1, $2, 'pending')
             ON CONFLICT (verse_id) DO NOTHING",
        )
        .bind(song_id)
        .bind(verse_id)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() > 0 {
            debug!(song_id = %song_id, verse = seq, "Enqueued generation job");
        }
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

pub(super) async fn mark_completed_in(
    conn: &mut PgConnection,
    job_id: Uuid,
) -> Result<GenerationJob> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "UPDATE generation_jobs SET
            status = 'completed', completed_at = NOW(), last_error = NULL, updated_at = NOW()
         WHERE id = $1
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(job_id)
    .fetch_optional(&mut *conn)
    .await?;
    let row = row.ok_or(ServiceError::JobNotFound(job_id))?;
    GenerationJob::try_from(row)
}
