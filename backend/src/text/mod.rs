//! Sentence-level text delta
//!
//! Revisions are priced by how much of the proposal actually changed. The
//! delta is computed by sentence tokenization followed by sequence
//! matching over the sentence lists: 0.0 means identical, 1.0 means no
//! sentence survived. The function is pure and deterministic, so equal
//! inputs always price equally within a run.

use crate::config::round_to;
use std::collections::BTreeMap;

/// Dissimilarity score between two texts in [0, 1].
///
/// Similarity is the classic sequence-matching ratio `2M / T`, where `M`
/// is the number of matching sentences (summed over the longest matching
/// blocks) and `T` the total sentence count of both texts. The delta is
/// `1 - ratio`, rounded to four decimals.
///
/// # Example
///
/// ```rust
/// use roundtable_consensus_core_rs::text::sentence_sequence_delta;
///
/// let old = "Keep the budget. Hire two staff. Review in May.";
/// assert_eq!(sentence_sequence_delta(old, old), 0.0);
///
/// let new = "Keep the budget. Hire four staff. Review in May.";
/// let delta = sentence_sequence_delta(old, new);
/// assert!(delta > 0.0 && delta < 1.0);
///
/// assert_eq!(sentence_sequence_delta(old, "Replace everything."), 1.0);
/// ```
pub fn sentence_sequence_delta(old_text: &str, new_text: &str) -> f64 {
    let old = split_sentences(old_text);
    let new = split_sentences(new_text);
    round_to(1.0 - sequence_ratio(&old, &new), 4)
}

/// Split text into trimmed sentences on `.`, `!` and `?` boundaries.
///
/// The terminator stays attached to its sentence so a statement and a
/// question with the same words do not match.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// Similarity ratio `2M / T` over two sequences; 1.0 for two empty
/// sequences.
fn sequence_ratio(a: &[String], b: &[String]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * total_matches(a, b) as f64 / total as f64
}

/// Sum of matching-block sizes: find the longest matching block, then
/// recurse on the pieces to its left and right.
fn total_matches(a: &[String], b: &[String]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size > 0 {
            total += size;
            pending.push((alo, i, blo, j));
            pending.push((i + size, ahi, j + size, bhi));
        }
    }
    total
}

/// Longest block of equal elements within the given windows.
///
/// Ties resolve to the earliest block in `a`, then in `b`, which keeps
/// the result independent of iteration incidentals.
fn longest_match(
    a: &[String],
    b: &[String],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let mut run_lengths: BTreeMap<usize, usize> = BTreeMap::new();

    for i in alo..ahi {
        let mut new_runs: BTreeMap<usize, usize> = BTreeMap::new();
        for j in blo..bhi {
            if a[i] == b[j] {
                let len = if j > blo {
                    run_lengths.get(&(j - 1)).copied().unwrap_or(0) + 1
                } else {
                    1
                };
                new_runs.insert(j, len);
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        run_lengths = new_runs;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_are_zero() {
        let text = "First point. Second point. Third point.";
        assert_eq!(sentence_sequence_delta(text, text), 0.0);
    }

    #[test]
    fn test_disjoint_texts_are_one() {
        let old = "Alpha beta. Gamma delta.";
        let new = "Epsilon zeta. Eta theta.";
        assert_eq!(sentence_sequence_delta(old, new), 1.0);
    }

    #[test]
    fn test_empty_texts_are_identical() {
        assert_eq!(sentence_sequence_delta("", ""), 0.0);
        assert_eq!(sentence_sequence_delta("   ", ""), 0.0);
    }

    #[test]
    fn test_one_changed_sentence_of_two() {
        // 1 matching sentence of 4 total: ratio 0.5, delta 0.5
        let old = "Keep the hall. Cancel catering.";
        let new = "Keep the hall. Double catering.";
        assert_eq!(sentence_sequence_delta(old, new), 0.5);
    }

    #[test]
    fn test_appended_sentence() {
        // 3 matching of 7 total: ratio 6/7, delta 1 - 6/7 = 0.1429
        let old = "One. Two. Three.";
        let new = "One. Two. Three. Four.";
        assert_eq!(sentence_sequence_delta(old, new), 0.1429);
    }

    #[test]
    fn test_reordered_sentences_lose_one_block() {
        // Sequence matching is order sensitive: swapping two sentences
        // keeps only the longer common block plus one stray match.
        let old = "One. Two. Three.";
        let new = "Two. One. Three.";
        let delta = sentence_sequence_delta(old, new);
        assert!(delta > 0.0 && delta < 1.0);
    }

    #[test]
    fn test_terminator_distinguishes_sentences() {
        let old = "We should proceed.";
        let new = "We should proceed?";
        assert_eq!(sentence_sequence_delta(old, new), 1.0);
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let old = "One.   Two.";
        let new = "One. Two.";
        assert_eq!(sentence_sequence_delta(old, new), 0.0);
    }

    #[test]
    fn test_split_sentences_keeps_terminators() {
        let sentences = split_sentences("A first. A second! A third? trailing");
        assert_eq!(
            sentences,
            vec!["A first.", "A second!", "A third?", "trailing"]
        );
    }
}
