//! # Similarity — Normalized Levenshtein Scoring
//!
//! Scores how alike two verse texts are, in `[0, 1]`. Both inputs are
//! normalized first (whitespace runs collapsed, trimmed, lowercased) so that
//! re-wrapping a verse across lines or changing its capitalization does not
//! count as an edit.
//!
//! ## Algorithm
//!
//! Classic Levenshtein distance over Unicode scalar values, computed with a
//! single DP row: O(|a|·|b|) time, O(|b|) space. The score is
//! `1 - d / max(|a|, |b|)`, and two empty strings score 1.

/// Collapse whitespace runs (including line breaks) to single spaces, trim,
/// and lowercase.
pub fn normalize_verse_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Levenshtein edit distance between two strings, counted in chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // row[j] holds the distance between a[..i] and b[..j]
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, &ca) in a.iter().enumerate() {
        let mut diag = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = if ca == cb { 0 } else { 1 };
            row[j + 1] = (above + 1).min(row[j] + 1).min(diag + cost);
            diag = above;
        }
    }
    row[b.len()]
}

/// Normalized similarity of two verse texts in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize_verse_text(a);
    let b = normalize_verse_text(b);
    similarity_normalized(&a, &b)
}

/// Similarity of two already-normalized strings.
///
/// The reconciler normalizes every verse once up front, so it calls this
/// directly instead of paying for normalization per candidate pair.
pub(crate) fn similarity_normalized(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_verse_text("  Hello\n\tWORLD   again \r\n"),
            "hello world again"
        );
        assert_eq!(normalize_verse_text("   \n\n  "), "");
    }

    #[test]
    fn levenshtein_known_values() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn levenshtein_counts_chars_not_bytes() {
        // 'é' is two bytes in UTF-8 but one edit
        assert_eq!(levenshtein("café", "cafe"), 1);
    }

    #[test]
    fn identical_after_normalization_scores_one() {
        assert_eq!(similarity("Hello  World", "hello\nworld"), 1.0);
    }

    #[test]
    fn both_empty_scores_one() {
        assert_eq!(similarity("", "   "), 1.0);
    }

    #[test]
    fn one_empty_scores_zero() {
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("", "abc"), 0.0);
    }

    #[test]
    fn punctuation_edit_stays_above_significance() {
        // 1 edit over 12 chars
        let score = similarity("Hello world", "Hello world!");
        assert!((score - (1.0 - 1.0 / 12.0)).abs() < 1e-9);
        assert!(score > 0.85);
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [
            ("the river runs", "a river ran"),
            ("", "x"),
            ("abc", "cba"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{a:?} vs {b:?}");
        }
    }
}
