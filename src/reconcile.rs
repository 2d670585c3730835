//! # Reconcile — Matching Edited Lyrics to Existing Verses
//!
//! When an administrator edits a song's full lyric text, each new verse is
//! either matched to an existing verse row (keeping its id, illustration and
//! generation job), inserted as a brand-new verse, or the old verse is
//! removed. This module computes that plan. Persisting it is the job of
//! [`Database::update_song_lyrics`](crate::db::Database::update_song_lyrics).
//!
//! ## Algorithm
//!
//! A bounded greedy heuristic, not a globally optimal alignment:
//!
//! 1. **Exact phase.** Previous verses are bucketed by normalized text. Each
//!    next verse, in order, consumes the lowest unused previous index with the
//!    same normalized text (score 1). No index window applies here, so pure
//!    reorders are always recognized.
//! 2. **Fuzzy phase.** Remaining pairs with `|old - new| <= FUZZY_INDEX_WINDOW`
//!    are scored with [`similarity`](crate::similarity). Candidates below
//!    `FUZZY_MATCH_FLOOR` are dropped. The rest are sorted by score desc,
//!    index distance asc, old index asc, new index asc, and accepted greedily
//!    while both sides are still free.
//! 3. Unmatched next indices are new verses; unmatched previous verses are
//!    removed.
//!
//! The tie-break order is part of the contract: results must be reproducible.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use uuid::Uuid;

use crate::similarity::{normalize_verse_text, similarity_normalized};

/// Maximum `|old_index - new_index|` considered in the fuzzy phase.
pub const FUZZY_INDEX_WINDOW: usize = 2;

/// Fuzzy candidates scoring below this are never matched.
pub const FUZZY_MATCH_FLOOR: f64 = 0.5;

/// Matches scoring below this count as a real content edit.
pub const SIGNIFICANT_CHANGE_THRESHOLD: f64 = 0.85;

/// A verse as it exists before the edit.
#[derive(Debug, Clone)]
pub struct ExistingVerse {
    pub id: Uuid,
    pub lyric_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VerseMatch {
    pub old_index: usize,
    pub new_index: usize,
    pub score: f64,
}

impl VerseMatch {
    pub fn is_significant(&self) -> bool {
        self.score < SIGNIFICANT_CHANGE_THRESHOLD
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcilePlan {
    /// Matched pairs, ordered by `new_index`.
    pub matches: Vec<VerseMatch>,
    /// Indices into the next verse list that need fresh verse rows.
    pub new_verse_indexes: Vec<usize>,
    /// Ids of previous verses with no counterpart, in previous order.
    pub removed_verse_ids: Vec<Uuid>,
}

impl ReconcilePlan {
    pub fn significant_matches(&self) -> impl Iterator<Item = &VerseMatch> {
        self.matches.iter().filter(|m| m.is_significant())
    }

    /// Any inserted verse or substantive text change invalidates the
    /// reviewed state of a published song.
    pub fn should_unpublish(&self) -> bool {
        !self.new_verse_indexes.is_empty() || self.significant_matches().next().is_some()
    }

    /// Whether applying the plan changes nothing at all: same verse count,
    /// every verse matched in place with identical normalized text.
    pub fn is_noop(&self, previous_len: usize) -> bool {
        self.new_verse_indexes.is_empty()
            && self.removed_verse_ids.is_empty()
            && self.matches.len() == previous_len
            && self
                .matches
                .iter()
                .all(|m| m.old_index == m.new_index && m.score >= 1.0)
    }
}

/// Compute the reconciliation plan for `previous` verses against `next`
/// verse texts.
///
/// Empty inputs are accepted here (the plan is trivially all-new or
/// all-removed); rejecting them is the caller's business.
pub fn reconcile<S: AsRef<str>>(previous: &[ExistingVerse], next: &[S]) -> ReconcilePlan {
    let prev_norm: Vec<String> = previous
        .iter()
        .map(|v| normalize_verse_text(&v.lyric_text))
        .collect();
    let next_norm: Vec<String> = next
        .iter()
        .map(|t| normalize_verse_text(t.as_ref()))
        .collect();

    let mut prev_used = vec![false; previous.len()];
    let mut next_used = vec![false; next.len()];
    let mut matches = Vec::new();

    // Exact phase
    let mut buckets: HashMap<&str, VecDeque<usize>> = HashMap::new();
    for (i, text) in prev_norm.iter().enumerate() {
        buckets.entry(text.as_str()).or_default().push_back(i);
    }
    for (j, text) in next_norm.iter().enumerate() {
        if let Some(i) = buckets.get_mut(text.as_str()).and_then(|b| b.pop_front()) {
            prev_used[i] = true;
            next_used[j] = true;
            matches.push(VerseMatch {
                old_index: i,
                new_index: j,
                score: 1.0,
            });
        }
    }

    // Fuzzy phase
    let mut candidates = Vec::new();
    for (i, old) in prev_norm.iter().enumerate() {
        if prev_used[i] {
            continue;
        }
        let lo = i.saturating_sub(FUZZY_INDEX_WINDOW);
        let hi = (i + FUZZY_INDEX_WINDOW).min(next_norm.len().saturating_sub(1));
        for j in lo..=hi {
            if j >= next_norm.len() || next_used[j] {
                continue;
            }
            let score = similarity_normalized(old, &next_norm[j]);
            if score >= FUZZY_MATCH_FLOOR {
                candidates.push(VerseMatch {
                    old_index: i,
                    new_index: j,
                    score,
                });
            }
        }
    }
    candidates.sort_by(compare_candidates);
    for c in candidates {
        if prev_used[c.old_index] || next_used[c.new_index] {
            continue;
        }
        prev_used[c.old_index] = true;
        next_used[c.new_index] = true;
        matches.push(c);
    }

    matches.sort_by_key(|m| m.new_index);

    let new_verse_indexes = (0..next.len()).filter(|&j| !next_used[j]).collect();
    let removed_verse_ids = previous
        .iter()
        .zip(&prev_used)
        .filter(|&(_, &used)| !used)
        .map(|(v, _)| v.id)
        .collect();

    ReconcilePlan {
        matches,
        new_verse_indexes,
        removed_verse_ids,
    }
}

fn compare_candidates(a: &VerseMatch, b: &VerseMatch) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| distance(a).cmp(&distance(b)))
        .then_with(|| a.old_index.cmp(&b.old_index))
        .then_with(|| a.new_index.cmp(&b.new_index))
}

fn distance(m: &VerseMatch) -> usize {
    m.old_index.abs_diff(m.new_index)
}
