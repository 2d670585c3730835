//! # Prompt — Illustration Prompts and Continuity Context
//!
//! The first verse of a song gets an anchoring prompt: title, the full
//! lyrics, and the art-style block, so the opening illustration fixes the
//! look of the whole song. Every later verse gets a short "next verse, same
//! style" prompt with only its own text and leans on the continuity context
//! for consistency.
//!
//! ## Continuity context
//!
//! Sent to the provider alongside the prompt as prior turns, one per earlier
//! verse (by sequence number): the verse text, then either the stored image
//! summary or a fallback note if an illustration exists, plus a low-detail
//! thumbnail reference when one is stored. Full-resolution images are never
//! re-sent.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::model::{SongDetail, Verse, VerseArtifact};

/// Art direction used when the configuration does not override it.
pub const DEFAULT_ART_STYLE: &str = "\
Hand-painted storybook illustration in gouache and watercolor. \
Soft natural light, warm muted palette with one accent color per scene, \
visible brush texture and paper grain. \
Expressive but simple figures with no readable faces, letters, or text anywhere in the image. \
Cinematic wide composition with a clear focal point and generous negative space. \
Consistent character designs, costumes, and color palette across every verse of the song.";

/// Heading that separates per-verse operator direction from the base prompt.
pub const ADDITIONAL_DIRECTION_HEADING: &str = "Additional direction for this verse:";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptParts {
    /// Prompt without operator direction.
    pub base_prompt: String,
    /// What is actually sent to the provider.
    pub full_prompt: String,
}

/// One earlier verse in the continuity context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuityTurn {
    pub sequence_number: i32,
    pub lyric_text: String,
    /// Image summary, or a fallback note when only the image is known.
    /// `None` when the verse has not been illustrated yet.
    pub illustration_note: Option<String>,
    /// Thumbnail URL to pass as a low-detail reference image.
    pub reference_image_url: Option<String>,
}

/// Whether `verse` is the song's first verse by sequence number.
pub fn is_first_verse(song: &SongDetail, verse: &Verse) -> bool {
    song.first_verse()
        .map(|first| first.id == verse.id)
        .unwrap_or(true)
}

/// Build the base and full prompt for one verse.
pub fn build_prompt(
    song: &SongDetail,
    verse: &Verse,
    additional_direction: Option<&str>,
    art_style: &str,
) -> PromptParts {
    let base_prompt = if is_first_verse(song, verse) {
        format!(
            "Song title: {title}\n\n\
             Full lyrics:\n{lyrics}\n\n\
             Art style:\n{style}\n\n\
             Illustrate verse 1 of this song:\n{verse}",
            title = song.song.title,
            lyrics = song.lyrics(),
            style = art_style.trim(),
            verse = verse.lyric_text,
        )
    } else {
        format!(
            "Illustrate the next verse of the same song, keeping the same art style, \
             characters, and palette as the previous illustrations.\n\n\
             Verse {n}:\n{verse}",
            n = verse.sequence_number,
            verse = verse.lyric_text,
        )
    };

    let full_prompt = match additional_direction.map(str::trim) {
        Some(direction) if !direction.is_empty() => format!(
            "{}\n\n{}\n{}",
            base_prompt, ADDITIONAL_DIRECTION_HEADING, direction
        ),
        _ => base_prompt.clone(),
    };

    PromptParts {
        base_prompt,
        full_prompt,
    }
}

/// Continuity turns for every verse before `verse`, in sequence order.
pub fn build_continuity(
    song: &SongDetail,
    verse: &Verse,
    artifacts: &[VerseArtifact],
) -> Vec<ContinuityTurn> {
    let by_verse: HashMap<Uuid, &VerseArtifact> =
        artifacts.iter().map(|a| (a.verse_id, a)).collect();

    let mut earlier: Vec<&Verse> = song
        .verses
        .iter()
        .filter(|v| v.sequence_number < verse.sequence_number)
        .collect();
    earlier.sort_by_key(|v| v.sequence_number);

    earlier
        .into_iter()
        .map(|v| {
            let artifact = by_verse.get(&v.id);
            let illustration_note = artifact.map(|a| {
                a.image_summary
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| continuity_fallback(v.sequence_number))
            });
            ContinuityTurn {
                sequence_number: v.sequence_number,
                lyric_text: v.lyric_text.clone(),
                illustration_note,
                reference_image_url: artifact.and_then(|a| a.thumbnail_url.clone()),
            }
        })
        .collect()
}

fn continuity_fallback(sequence_number: i32) -> String {
    format!(
        "An illustration already exists for verse {}. Maintain visual continuity with it.",
        sequence_number
    )
}
