use std::sync::Arc;
use std::time::Duration;

use crate::EmbedFn;
use crate::error::Result;
use crate::fusion::{self, RetrievalResult, Weights};
use crate::lexical::LexicalIndex;
use crate::relevance;
use crate::semantic::{SemanticIndex, embed_with_timeout};

/// Semantic and lexical search over one project, fused and filtered.
pub struct HybridRetriever {
    project_id: String,
    semantic: Arc<SemanticIndex>,
    lexical: Arc<LexicalIndex>,
    embed_fn: EmbedFn,
    embed_timeout: Duration,
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("project_id", &self.project_id)
            .field("semantic_entries", &self.semantic.len())
            .field("lexical", &self.lexical)
            .finish_non_exhaustive()
    }
}

impl HybridRetriever {
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        semantic: SemanticIndex,
        lexical: LexicalIndex,
        embed_fn: EmbedFn,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            semantic: Arc::new(semantic),
            lexical: Arc::new(lexical),
            embed_fn,
            embed_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub fn semantic(&self) -> &SemanticIndex {
        &self.semantic
    }

    #[must_use]
    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    /// Hybrid search returning at most `k` results, best first.
    ///
    /// Any failure in the fused path falls back to semantic-only retrieval.
    ///
    /// # Errors
    ///
    /// Returns an error only if the semantic fallback fails as well, which in
    /// practice means the query could not be embedded.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        weights: Weights,
    ) -> Result<Vec<RetrievalResult>> {
        match self.try_search(query, k, weights).await {
            Ok(results) => Ok(results),
            Err(e) => {
                tracing::warn!(
                    project_id = %self.project_id,
                    error = %e,
                    "hybrid search failed, falling back to semantic search"
                );
                self.semantic_search(query, k, weights).await
            }
        }
    }

    async fn try_search(
        &self,
        query: &str,
        k: usize,
        weights: Weights,
    ) -> Result<Vec<RetrievalResult>> {
        let n = fusion::candidate_pool(k);
        let query_vector = embed_with_timeout(&self.embed_fn, query, self.embed_timeout).await?;
        let semantic = self.semantic.search(&query_vector, n);

        if !self.lexical.is_available() {
            tracing::debug!(project_id = %self.project_id, "lexical index unavailable, semantic only");
            return Ok(fusion::semantic_only(&semantic, k, n, weights));
        }

        let lexical = match self.lexical.search(query, n) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(project_id = %self.project_id, error = %e, "lexical search failed, semantic only");
                return Ok(fusion::semantic_only(&semantic, k, n, weights));
            }
        };

        let fused = fusion::fuse(&semantic, &lexical, n, weights);
        let filtered = relevance::filter(fused, query, k);
        tracing::debug!(
            project_id = %self.project_id,
            semantic = semantic.len(),
            lexical = lexical.len(),
            returned = filtered.len(),
            "hybrid search"
        );
        Ok(filtered)
    }

    /// Semantic index alone, rank-scored, at most `k` results.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded.
    pub async fn semantic_search(
        &self,
        query: &str,
        k: usize,
        weights: Weights,
    ) -> Result<Vec<RetrievalResult>> {
        let query_vector = embed_with_timeout(&self.embed_fn, query, self.embed_timeout).await?;
        let hits = self.semantic.search(&query_vector, k);
        Ok(fusion::semantic_only(
            &hits,
            k,
            fusion::candidate_pool(k),
            weights,
        ))
    }
}
