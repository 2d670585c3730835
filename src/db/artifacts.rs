//! Verse artifact operations.
//!
//! An artifact is the recorded output of the latest successful generation
//! for a verse: prompt, provider/model, stored image paths, and an optional
//! natural-language summary that later verses use for continuity. There is
//! at most one per verse (`ON CONFLICT (verse_id) DO UPDATE`).

use anyhow::Result;
use uuid::Uuid;

use super::{ArtifactRow, Database, ARTIFACT_COLUMNS};
use crate::model::{GenerationJob, NewArtifact, VerseArtifact};

impl Database {
    /// All artifacts for a song's verses, in verse order.
    pub async fn list_artifacts_for_song(&self, song_id: Uuid) -> Result<Vec<VerseArtifact>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            "SELECT a.id, a.job_id, a.verse_id, a.prompt, a.provider, a.model,
                    a.image_url, a.storage_path, a.thumbnail_path, a.thumbnail_url,
                    a.image_summary, a.created_at, a.updated_at
             FROM verse_artifacts a
             JOIN verses v ON v.id = a.verse_id
             WHERE v.song_id = $1
             ORDER BY v.sequence_number ASC",
        )
        .bind(song_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(VerseArtifact::from).collect())
    }

    /// Get the artifact for a verse, if one exists.
    pub async fn get_artifact_for_verse(&self, verse_id: Uuid) -> Result<Option<VerseArtifact>> {
        let row = sqlx::query_as::<_, ArtifactRow>(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM verse_artifacts WHERE verse_id = $1"
        ))
        .bind(verse_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(VerseArtifact::from))
    }

    /// Record a successful generation in one transaction: upsert the verse's
    /// artifact, point the verse at the new illustration, and mark the job
    /// completed. Fails with `JobNotFound` (rolling everything back) if the
    /// job vanished while the provider was working.
    pub async fn complete_job_with_artifact(
        &self,
        job: &GenerationJob,
        artifact: &NewArtifact,
    ) -> Result<(GenerationJob, VerseArtifact)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ArtifactRow>(&format!(
            "INSERT INTO verse_artifacts
                (job_id, verse_id, prompt, provider, model, image_url,
                 storage_path, thumbnail_path, thumbnail_url, image_summary)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (verse_id) DO UPDATE SET
                job_id = EXCLUDED.job_id,
                prompt = EXCLUDED.prompt,
                provider = EXCLUDED.provider,
                model = EXCLUDED.model,
                image_url = EXCLUDED.image_url,
                storage_path = EXCLUDED.storage_path,
                thumbnail_path = EXCLUDED.thumbnail_path,
                thumbnail_url = EXCLUDED.thumbnail_url,
                image_summary = EXCLUDED.image_summary,
                updated_at = NOW()
             RETURNING {ARTIFACT_COLUMNS}"
        ))
        .bind(job.id)
        .bind(job.verse_id)
        .bind(&artifact.prompt)
        .bind(&artifact.provider)
        .bind(&artifact.model)
        .bind(&artifact.image_url)
        .bind(&artifact.storage_path)
        .bind(&artifact.thumbnail_path)
        .bind(&artifact.thumbnail_url)
        .bind(&artifact.image_summary)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE verses SET illustration_url = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(job.verse_id)
        .bind(&artifact.image_url)
        .execute(&mut *tx)
        .await?;

        let completed = super::jobs::mark_completed_in(&mut tx, job.id).await?;
        tx.commit().await?;
        Ok((completed, VerseArtifact::from(row)))
    }
}
