//! # Generation — Per-Verse Illustration Runner
//!
//! One invocation of [`Runner::process_next_job`] claims a single pending
//! job and drives it to a settled state:
//!
//! ```text
//! claim ─▶ artifacts for song ─▶ prompt + continuity ─▶ provider.generate
//!       ─▶ store full + thumbnail ─▶ upsert artifact + complete job (one tx)
//! ```
//!
//! Any error after the claim marks the job `failed` with the error text and
//! is returned to the caller. If the job row is gone by then, the
//! [`ServiceError::JobNotFound`](crate::ServiceError::JobNotFound) from the
//! failure update is returned instead. There is exactly one provider call per claim
//! and no retry loop; a failed job waits for an operator reset.
//!
//! The thumbnail variant is stored from the same bytes as the full image.
//! Providers reference it at low detail, so no resize happens here.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::GenerationConfig;
use crate::db::Database;
use crate::error::ServiceError;
use crate::model::{ClaimedJob, GenerationJob, NewArtifact, VerseArtifact};
use crate::prompt::{build_continuity, build_prompt};
use crate::provider::{GenerationRequest, ImageProvider};
use crate::storage::{IllustrationStore, Variant};

/// A job the runner finished successfully.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job: GenerationJob,
    pub artifact: VerseArtifact,
    pub song_slug: String,
    pub sequence_number: i32,
}

/// Totals from a bounded [`Runner::process_jobs`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkSummary {
    pub completed: u32,
    pub failed: u32,
}

pub struct Runner<P, S> {
    db: Database,
    provider: P,
    store: S,
    settings: GenerationConfig,
}

impl<P: ImageProvider, S: IllustrationStore> Runner<P, S> {
    pub fn new(db: Database, provider: P, store: S, settings: GenerationConfig) -> Self {
        Runner {
            db,
            provider,
            store,
            settings,
        }
    }

    /// Claim and process one job. `Ok(None)` means the queue was empty.
    pub async fn process_next_job(&self) -> Result<Option<JobOutcome>> {
        let Some(claimed) = self.db.claim_next_job().await? else {
            return Ok(None);
        };
        self.process_claimed(claimed).await.map(Some)
    }

    /// Process up to `limit` jobs, stopping early when the queue drains.
    /// A failed job is counted and the run moves on. Claim errors and jobs
    /// that vanished mid-run abort.
    pub async fn process_jobs(&self, limit: u32) -> Result<WorkSummary> {
        let mut summary = WorkSummary::default();
        for _ in 0..limit {
            let Some(claimed) = self.db.claim_next_job().await? else {
                break;
            };
            match self.process_claimed(claimed).await {
                Ok(_) => summary.completed += 1,
                Err(e) if matches!(
                    e.downcast_ref::<ServiceError>(),
                    Some(ServiceError::JobNotFound(_))
                ) =>
                {
                    return Err(e)
                }
                Err(_) => summary.failed += 1,
            }
        }
        info!(
            completed = summary.completed,
            failed = summary.failed,
            "Generation run finished"
        );
        Ok(summary)
    }

    async fn process_claimed(&self, claimed: ClaimedJob) -> Result<JobOutcome> {
        let job_id = claimed.job.id;
        match self.generate(&claimed).await {
            Ok(outcome) => {
                info!(
                    job_id = %job_id,
                    song = %outcome.song_slug,
                    verse = outcome.sequence_number,
                    image_url = %outcome.artifact.image_url,
                    "Generation job completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!(
                    job_id = %job_id,
                    song = %claimed.song.song.slug,
                    verse = claimed.verse.sequence_number,
                    error = %message,
                    "Generation job failed"
                );
                // A job that can no longer be marked failed is the harder error
                self.db.mark_job_failed(job_id, &message).await?;
                Err(e)
            }
        }
    }

    async fn generate(&self, claimed: &ClaimedJob) -> Result<JobOutcome> {
        let ClaimedJob { job, song, verse } = claimed;
        let song_id: Uuid = song.song.id;

        let artifacts = self.db.list_artifacts_for_song(song_id).await?;
        let prompt = build_prompt(
            song,
            verse,
            job.additional_prompt_direction.as_deref(),
            &self.settings.art_style,
        );
        let continuity = build_continuity(song, verse, &artifacts);

        let request = GenerationRequest {
            model: &self.settings.model,
            prompt: &prompt.full_prompt,
            continuity: &continuity,
            size: &self.settings.size,
        };
        let image = self
            .provider
            .generate(&request)
            .await
            .with_context(|| format!("{} image generation failed", self.provider.name()))?;

        let full = self
            .store
            .upload(song_id, verse.id, &image.bytes, Variant::Full)
            .await?;
        let thumbnail = self
            .store
            .upload(song_id, verse.id, &image.bytes, Variant::Thumbnail)
            .await?;

        if let Some(conversation_id) = image.conversation_id.as_deref() {
            if song.song.generation_conversation_id.as_deref() != Some(conversation_id) {
                self.db.set_conversation_id(song_id, conversation_id).await?;
            }
        }

        let new_artifact = NewArtifact {
            prompt: prompt.full_prompt,
            provider: self.provider.name().to_string(),
            model: self.settings.model.clone(),
            image_url: full.public_url,
            storage_path: full.path,
            thumbnail_path: Some(thumbnail.path),
            thumbnail_url: Some(thumbnail.public_url),
            image_summary: image.summary,
        };
        let (job, artifact) = self.db.complete_job_with_artifact(job, &new_artifact).await?;

        Ok(JobOutcome {
            job,
            artifact,
            song_slug: song.song.slug.clone(),
            sequence_number: verse.sequence_number,
        })
    }
}
