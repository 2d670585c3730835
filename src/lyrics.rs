//! Lyric text helpers: verse splitting, slugs, tags, language codes.
//!
//! Verses are separated by one or more blank lines. A line holding only
//! whitespace counts as blank. Each verse is trimmed and empty verses are
//! dropped, so leading/trailing blank lines and runs of blank lines never
//! produce phantom verses.

use crate::error::ServiceError;

/// Split raw lyric text into trimmed, non-empty verses.
pub fn split_verses(lyrics: &str) -> Vec<String> {
    let mut verses = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in lyrics.lines() {
        if line.trim().is_empty() {
            flush_verse(&mut current, &mut verses);
        } else {
            current.push(line.trim_end());
        }
    }
    flush_verse(&mut current, &mut verses);
    verses
}

fn flush_verse(current: &mut Vec<&str>, verses: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let verse = current.join("\n").trim().to_string();
    current.clear();
    if !verse.is_empty() {
        verses.push(verse);
    }
}

/// URL-safe slug: lowercase alphanumerics joined by single hyphens.
///
/// Falls back to `"song"` when nothing survives (e.g. a title made only of
/// punctuation), so callers always get a usable slug.
pub fn slugify(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "song".to_string()
    } else {
        slug
    }
}

/// First of `base`, `base-2`, `base-3`, … not present in `taken`.
pub fn unique_slug<S: AsRef<str>>(base: &str, taken: &[S]) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|t| t.as_ref() == candidate);
    if !is_taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !is_taken(candidate.as_str()))
        .unwrap_or_else(|| base.to_string())
}

/// Lowercase, trim, drop empties, and dedupe tags in first-seen order.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Normalize a language code (`"EN"` → `"en"`, `"pt-BR"` → `"pt-br"`).
/// Empty input defaults to `"en"`.
pub fn normalize_language(code: &str) -> Result<String, ServiceError> {
    let code = code.trim().to_lowercase();
    if code.is_empty() {
        return Ok("en".to_string());
    }
    let valid = (2..=8).contains(&code.len())
        && code.chars().all(|c| c.is_ascii_lowercase() || c == '-')
        && !code.starts_with('-')
        && !code.ends_with('-');
    if !valid {
        return Err(ServiceError::Validation(format!(
            "Invalid language code '{}'.",
            code
        )));
    }
    Ok(code)
}

/// Trim a song title, rejecting blank ones.
pub fn normalize_title(title: &str) -> Result<String, ServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::Validation(
            "Song title must not be empty.".to_string(),
        ));
    }
    Ok(title.to_string())
}

/// Split lyrics and reject text with no verse content.
pub fn require_verses(lyrics: &str) -> Result<Vec<String>, ServiceError> {
    let verses = split_verses(lyrics);
    if verses.is_empty() {
        return Err(ServiceError::Validation(
            "Song must contain at least one verse with content.".to_string(),
        ));
    }
    Ok(verses)
}
