//! Post-fusion relevance filtering: adaptive score threshold plus a lexical term check.

use crate::fusion::RetrievalResult;
use crate::lexical::STOP_WORDS;

/// Results kept when filtering would otherwise return nothing.
const FALLBACK_KEEP: usize = 2;
const THRESHOLD_FLOOR: f32 = 0.1;
const RELAX_FACTOR: f32 = 0.7;
const MIN_FUZZY_TERM_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreStats {
    pub max: f32,
    pub avg: f32,
    pub stddev: f32,
    pub threshold: f32,
}

/// Statistics over positive scores. `threshold = max(0.1, max(avg * 0.3, max * 0.15))`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score_stats(results: &[RetrievalResult]) -> ScoreStats {
    let positive: Vec<f32> = results
        .iter()
        .map(|r| r.hybrid_score)
        .filter(|s| *s > 0.0)
        .collect();
    if positive.is_empty() {
        return ScoreStats {
            max: 0.0,
            avg: 0.0,
            stddev: 0.0,
            threshold: THRESHOLD_FLOOR,
        };
    }
    let count = positive.len() as f32;
    let max = positive.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let avg = positive.iter().sum::<f32>() / count;
    let variance = positive.iter().map(|s| (s - avg).powi(2)).sum::<f32>() / count;
    ScoreStats {
        max,
        avg,
        stddev: variance.sqrt(),
        threshold: THRESHOLD_FLOOR.max((avg * 0.3).max(max * 0.15)),
    }
}

/// Lowercased query terms longer than two characters, stopwords removed, deduplicated.
#[must_use]
pub fn significant_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in query.split(|c: char| !c.is_alphanumeric()) {
        let term = raw.to_lowercase();
        if term.chars().count() > 2
            && !STOP_WORDS.contains(&term.as_str())
            && !terms.contains(&term)
        {
            terms.push(term);
        }
    }
    terms
}

/// Exact substring match, or for terms of four or more characters a match on
/// the prefix covering 70% of the term (rounded up).
#[must_use]
pub fn term_matches(term: &str, haystack: &str) -> bool {
    if haystack.contains(term) {
        return true;
    }
    let len = term.chars().count();
    if len < MIN_FUZZY_TERM_CHARS {
        return false;
    }
    let prefix_len = (len * 7).div_ceil(10);
    let prefix: String = term.chars().take(prefix_len).collect();
    haystack.contains(&prefix)
}

/// At least a quarter of `terms` appear in the result's text or title.
/// A query without significant terms passes.
#[must_use]
pub fn lexically_relevant(result: &RetrievalResult, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let haystack = format!("{} {}", result.text, result.metadata.title).to_lowercase();
    let matched = terms.iter().filter(|t| term_matches(t, &haystack)).count();
    matched * 4 >= terms.len()
}

fn apply(candidates: &[RetrievalResult], threshold: f32, terms: &[String]) -> Vec<RetrievalResult> {
    candidates
        .iter()
        .filter(|r| r.hybrid_score >= threshold && lexically_relevant(r, terms))
        .cloned()
        .collect()
}

/// Filter fused candidates (sorted best first) down to at most `k` results.
///
/// When fewer than two survive out of more than two candidates, the threshold
/// is relaxed once by 0.7. If nothing survives, the top two candidates are kept.
#[must_use]
pub fn filter(candidates: Vec<RetrievalResult>, query: &str, k: usize) -> Vec<RetrievalResult> {
    if candidates.is_empty() {
        return candidates;
    }
    let stats = score_stats(&candidates);
    let terms = significant_terms(query);
    tracing::debug!(
        max = stats.max,
        avg = stats.avg,
        stddev = stats.stddev,
        threshold = stats.threshold,
        terms = terms.len(),
        "relevance filter"
    );

    let mut kept = apply(&candidates, stats.threshold, &terms);
    if kept.len() < FALLBACK_KEEP && candidates.len() > FALLBACK_KEEP {
        let relaxed = apply(&candidates, stats.threshold * RELAX_FACTOR, &terms);
        if relaxed.len() > kept.len() {
            tracing::debug!(kept = relaxed.len(), "relaxed relevance threshold");
            kept = relaxed;
        }
    }
    if kept.is_empty() {
        tracing::warn!(
            candidates = candidates.len(),
            "relevance filter removed every candidate, keeping top results"
        );
        kept = candidates.into_iter().take(FALLBACK_KEEP).collect();
    }
    kept.truncate(k);
    kept
}
