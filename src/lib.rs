//! # Versecraft — Song Illustration Platform
//!
//! Songs are split into verses; every verse gets one illustration from an
//! image-generation provider, driven by a PostgreSQL job queue.
//!
//! ## Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`similarity`] | Normalized Levenshtein similarity between verse texts |
//! | [`reconcile`] | Match old verses to edited lyrics, decide what to keep |
//! | [`lyrics`] | Verse splitting, slugs, tags, language codes |
//! | [`model`] | Domain entities and operator-facing shapes |
//! | [`db`] | Songs, verses, generation jobs, artifacts (sqlx/PostgreSQL) |
//! | [`prompt`] | Per-verse prompts and continuity context |
//! | [`provider`] | Image-generation backends |
//! | [`storage`] | Illustration blob storage |
//! | [`generation`] | Claim-generate-store-complete runner |
//! | [`config`] | TOML settings |
//! | [`error`] | Typed service errors carried in `anyhow::Error` |
//!
//! ## Editing lyrics
//!
//! Editing a song never throws away illustrations that still fit. The
//! reconciler keeps every verse whose text survives exactly or nearly
//! (same verse identity, same job, same artifact), inserts and enqueues the
//! genuinely new ones, deletes the rest, and unpublishes the song when a verse
//! was inserted or a kept verse changed substantially.

pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod lyrics;
pub mod model;
pub mod prompt;
pub mod provider;
pub mod reconcile;
pub mod similarity;
pub mod storage;

pub use error::ServiceError;
pub use lyrics::{normalize_tags, slugify, split_verses};
pub use reconcile::{reconcile, ExistingVerse, ReconcilePlan, VerseMatch};
pub use similarity::{levenshtein, normalize_verse_text, similarity};
