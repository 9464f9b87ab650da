//! Rank-based score fusion of semantic and lexical candidate lists.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, ScoredChunk};

/// Fixed bonus for chunks retrieved by both signals.
pub const OVERLAP_BONUS: f32 = 0.3;
/// Minimum normalized lexical score, so no lexical hit contributes zero.
pub const LEXICAL_FLOOR: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub semantic: f32,
    pub keyword: f32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            semantic: 0.6,
            keyword: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Semantic,
    Keyword,
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub document_id: String,
    pub title: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub text: String,
    pub metadata: ResultMetadata,
    pub semantic_score: Option<f32>,
    pub lexical_score: Option<f32>,
    pub hybrid_score: f32,
    pub provenance: Provenance,
}

impl RetrievalResult {
    fn from_chunk(chunk: &Chunk, provenance: Provenance) -> Self {
        Self {
            text: chunk.text.clone(),
            metadata: ResultMetadata {
                document_id: chunk.document_id.clone(),
                title: chunk.title.clone(),
                project_id: chunk.project_id.clone(),
            },
            semantic_score: None,
            lexical_score: None,
            hybrid_score: 0.0,
            provenance,
        }
    }

    fn dedup_key(&self) -> (String, String) {
        (
            self.metadata.document_id.clone(),
            crate::document::fingerprint(&self.text),
        )
    }
}

/// Candidates requested from each index for a final result size of `k`.
#[must_use]
pub fn candidate_pool(k: usize) -> usize {
    k.saturating_mul(3).max(15)
}

/// `weight * (1 - rank / max(n - 1, 1))`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rank_score(weight: f32, rank: usize, n: usize) -> f32 {
    let denom = n.saturating_sub(1).max(1) as f32;
    weight * (1.0 - rank as f32 / denom)
}

/// Min-max scale raw scores into `[LEXICAL_FLOOR, 1]`. All-equal scores map to 1.
#[must_use]
pub fn normalize_lexical(scores: &[f32]) -> Vec<f32> {
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    scores
        .iter()
        .map(|s| {
            let norm = if (max - min).abs() < f32::EPSILON {
                1.0
            } else {
                (s - min) / (max - min)
            };
            norm.max(LEXICAL_FLOOR)
        })
        .collect()
}

/// Rank-scored semantic results without fusion, truncated to `k`.
#[must_use]
pub fn semantic_only(
    candidates: &[ScoredChunk],
    k: usize,
    n: usize,
    weights: Weights,
) -> Vec<RetrievalResult> {
    candidates
        .iter()
        .take(k)
        .enumerate()
        .map(|(rank, c)| {
            let score = rank_score(weights.semantic, rank, n);
            let mut r = RetrievalResult::from_chunk(&c.chunk, Provenance::Semantic);
            r.semantic_score = Some(score);
            r.hybrid_score = score;
            r
        })
        .collect()
}

/// Merge both candidate lists by `(document_id, fingerprint)` and sort by hybrid score.
///
/// `n` is the candidate pool size used for rank scoring. The output is unfiltered.
#[must_use]
pub fn fuse(
    semantic: &[ScoredChunk],
    lexical: &[ScoredChunk],
    n: usize,
    weights: Weights,
) -> Vec<RetrievalResult> {
    let mut merged: Vec<RetrievalResult> = Vec::with_capacity(semantic.len() + lexical.len());
    let mut by_key: HashMap<(String, String), usize> = HashMap::new();

    for (rank, c) in semantic.iter().enumerate() {
        let key = c.chunk.dedup_key();
        if by_key.contains_key(&key) {
            continue;
        }
        let score = rank_score(weights.semantic, rank, n);
        let mut r = RetrievalResult::from_chunk(&c.chunk, Provenance::Semantic);
        r.semantic_score = Some(score);
        r.hybrid_score = score;
        by_key.insert(key, merged.len());
        merged.push(r);
    }

    let raw: Vec<f32> = lexical.iter().map(|c| c.score).collect();
    let normalized = normalize_lexical(&raw);
    for (c, norm) in lexical.iter().zip(normalized) {
        let score = weights.keyword * norm.max(LEXICAL_FLOOR);
        let key = c.chunk.dedup_key();
        match by_key.get(&key) {
            Some(&idx) => {
                let r = &mut merged[idx];
                if r.lexical_score.is_some() {
                    continue;
                }
                let semantic_score = r.semantic_score.unwrap_or(0.0);
                r.lexical_score = Some(score);
                r.hybrid_score = semantic_score + score + OVERLAP_BONUS;
                r.provenance = Provenance::Hybrid;
            }
            None => {
                let mut r = RetrievalResult::from_chunk(&c.chunk, Provenance::Keyword);
                r.lexical_score = Some(score);
                r.hybrid_score = score;
                by_key.insert(key, merged.len());
                merged.push(r);
            }
        }
    }

    sort_by_score(&mut merged);
    merged
}

/// Stable descending sort by hybrid score.
pub fn sort_by_score(results: &mut [RetrievalResult]) {
    results.sort_by(|a, b| b.hybrid_score.total_cmp(&a.hybrid_score));
}

/// Remove results whose key already appeared earlier in the list.
#[must_use]
pub fn dedup(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut seen = std::collections::HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sc(doc: &str, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                document_id: doc.into(),
                project_id: "p".into(),
                title: doc.to_uppercase(),
                text: text.into(),
                position: 0,
            },
            score,
        }
    }

    #[test]
    fn candidate_pool_has_floor() {
        assert_eq!(candidate_pool(1), 15);
        assert_eq!(candidate_pool(5), 15);
        assert_eq!(candidate_pool(6), 18);
        assert_eq!(candidate_pool(15), 45);
        assert_eq!(candidate_pool(usize::MAX), usize::MAX);
    }

    #[test]
    fn rank_score_spans_weight_to_zero() {
        assert!((rank_score(0.6, 0, 15) - 0.6).abs() < 1e-6);
        assert!(rank_score(0.6, 14, 15).abs() < 1e-6);
        assert!((rank_score(1.0, 0, 1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_floors_and_handles_equal_scores() {
        let n = normalize_lexical(&[2.0, 6.0, 10.0]);
        assert!((n[0] - LEXICAL_FLOOR).abs() < 1e-6);
        assert!((n[1] - 0.5).abs() < 1e-6);
        assert!((n[2] - 1.0).abs() < 1e-6);
        assert_eq!(normalize_lexical(&[3.0, 3.0]), vec![1.0, 1.0]);
        assert!(normalize_lexical(&[]).is_empty());
    }

    #[test]
    fn overlap_is_tagged_hybrid_with_bonus() {
        let semantic = vec![sc("a", "shared text", 0.9), sc("b", "only semantic", 0.8)];
        let lexical = vec![sc("a", "shared text", 7.0), sc("c", "only keyword", 3.0)];
        let fused = fuse(&semantic, &lexical, 15, Weights::default());

        assert_eq!(fused.len(), 3);
        let a = fused.iter().find(|r| r.metadata.document_id == "a").unwrap();
        assert_eq!(a.provenance, Provenance::Hybrid);
        let expected = 0.6 + 0.4 + OVERLAP_BONUS;
        assert!((a.hybrid_score - expected).abs() < 1e-6);
        assert_eq!(fused[0].metadata.document_id, "a");

        let c = fused.iter().find(|r| r.metadata.document_id == "c").unwrap();
        assert_eq!(c.provenance, Provenance::Keyword);
        assert!((c.hybrid_score - 0.4 * LEXICAL_FLOOR).abs() < 1e-6);
    }

    #[test]
    fn dedup_key_uses_first_fifty_chars() {
        let prefix = "x".repeat(50);
        let semantic = vec![sc("a", &format!("{prefix} tail one"), 0.9)];
        let lexical = vec![sc("a", &format!("{prefix} tail two"), 1.0)];
        let fused = fuse(&semantic, &lexical, 15, Weights::default());
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].provenance, Provenance::Hybrid);
    }

    #[test]
    fn semantic_only_truncates_and_scores_by_rank() {
        let candidates: Vec<ScoredChunk> = (0..10)
            .map(|i| sc(&format!("d{i}"), &format!("text {i}"), 1.0))
            .collect();
        let out = semantic_only(&candidates, 4, 15, Weights::default());
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|r| r.provenance == Provenance::Semantic));
        assert!(out.windows(2).all(|w| w[0].hybrid_score > w[1].hybrid_score));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let a = semantic_only(&[sc("a", "same", 1.0)], 1, 15, Weights::default());
        let mut twice = a.clone();
        twice.extend(a);
        assert_eq!(dedup(twice).len(), 1);
    }

    mod proptest_fusion {
        use super::*;
        use proptest::prelude::*;

        fn candidates(max: usize) -> impl Strategy<Value = Vec<ScoredChunk>> {
            prop::collection::vec((0usize..12, 0.0f32..20.0), 0..max).prop_map(|items| {
                items
                    .into_iter()
                    .map(|(doc, score)| sc(&format!("d{doc}"), &format!("chunk of d{doc}"), score))
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn fusion_is_idempotent(
                semantic in candidates(20),
                lexical in candidates(20),
                w_sem in 0.0f32..1.0,
                w_kw in 0.0f32..1.0,
            ) {
                let weights = Weights { semantic: w_sem, keyword: w_kw };
                let first = fuse(&semantic, &lexical, 15, weights);
                let second = fuse(&semantic, &lexical, 15, weights);
                prop_assert_eq!(first, second);
            }

            #[test]
            fn overlap_never_scores_below_semantic(
                semantic in candidates(20),
                lexical in candidates(20),
            ) {
                for r in fuse(&semantic, &lexical, 15, Weights::default()) {
                    if r.provenance == Provenance::Hybrid {
                        prop_assert!(r.hybrid_score >= r.semantic_score.unwrap_or(0.0));
                    }
                }
            }

            #[test]
            fn semantic_only_is_bounded_and_non_increasing(
                semantic in candidates(40),
                k in 1usize..20,
            ) {
                let out = semantic_only(&semantic, k, candidate_pool(k), Weights::default());
                prop_assert!(out.len() <= k);
                prop_assert!(out.windows(2).all(|w| w[0].hybrid_score >= w[1].hybrid_score));
            }

            #[test]
            fn fused_output_is_sorted(
                semantic in candidates(20),
                lexical in candidates(20),
            ) {
                let out = fuse(&semantic, &lexical, 15, Weights::default());
                prop_assert!(out.windows(2).all(|w| w[0].hybrid_score >= w[1].hybrid_score));
            }
        }
    }
}
