//! Error taxonomy for song and job operations.
//!
//! Database functions return `anyhow::Result` like the rest of the crate.
//! When a failure has a meaning the caller must act on (show a message,
//! retry, alert), it is raised as a [`ServiceError`] inside the `anyhow`
//! error so callers can `downcast_ref::<ServiceError>()`.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Input rejected before any mutation. The message is user-facing.
    #[error("{0}")]
    Validation(String),

    #[error("Song '{0}' not found.")]
    SongNotFound(String),

    /// Optimistic check failed: rows changed underneath the transaction.
    /// Nothing was committed; the caller should reload and retry.
    #[error("{0}")]
    Conflict(String),

    /// A claimed job disappeared before it could be finished. Indicates a
    /// logic error upstream and must not be retried.
    #[error("Generation job {0} not found.")]
    JobNotFound(Uuid),

    /// A claimed job points at a song with no verses.
    #[error("Song {0} has no verses.")]
    NoVerses(Uuid),
}

impl ServiceError {
    /// Whether the operation may succeed if the caller reloads and retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }
}
