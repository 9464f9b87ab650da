//! Per-project index lifecycle and the in-process registry of built retrievers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::Result;
use crate::lexical::LexicalIndex;
use crate::retriever::HybridRetriever;
use crate::semantic::{LoadOutcome, SemanticStore};
use crate::splitter::{ChunkSplitter, SplitterConfig};
use crate::store::{DocumentStore, FetchPolicy, fetch_with_retry};

#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryConfig {
    pub splitter: SplitterConfig,
    pub fetch: FetchPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// Already built during this process lifetime; nothing was done.
    AlreadyBuilt,
    /// The project has no indexable content. Nothing was persisted or registered.
    Empty,
    Built {
        documents: usize,
        chunks: usize,
        degraded_entries: usize,
        lexical_available: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    Regenerate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexReport {
    Valid { entries: usize, dimensions: usize },
    Missing { action: RepairAction },
    Corrupt { reason: String, action: RepairAction },
}

/// Owns per-project retrievers. Builds for one project are serialized by a
/// per-project lock and registration never replaces an existing retriever.
pub struct IndexRegistry {
    store: Arc<dyn DocumentStore>,
    semantic: SemanticStore,
    splitter: ChunkSplitter,
    fetch: FetchPolicy,
    retrievers: RwLock<HashMap<String, Arc<HybridRetriever>>>,
    build_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRegistry")
            .field("semantic", &self.semantic)
            .field("fetch", &self.fetch)
            .finish_non_exhaustive()
    }
}

impl IndexRegistry {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        semantic: SemanticStore,
        config: RegistryConfig,
    ) -> Self {
        Self {
            store,
            semantic,
            splitter: ChunkSplitter::new(config.splitter),
            fetch: config.fetch,
            retrievers: RwLock::new(HashMap::new()),
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    #[must_use]
    pub fn semantic_store(&self) -> &SemanticStore {
        &self.semantic
    }

    /// Retriever registered for `project_id` in this process, if any.
    #[must_use]
    pub fn get(&self, project_id: &str) -> Option<Arc<HybridRetriever>> {
        self.retrievers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(project_id)
            .cloned()
    }

    #[must_use]
    pub fn is_registered(&self, project_id: &str) -> bool {
        self.get(project_id).is_some()
    }

    fn build_lock(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .build_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(project_id.to_owned()).or_default())
    }

    /// Insert unless another retriever is already registered; returns the winner.
    fn register(&self, retriever: HybridRetriever) -> Arc<HybridRetriever> {
        let mut map = self
            .retrievers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(retriever.project_id().to_owned())
                .or_insert_with(|| Arc::new(retriever)),
        )
    }

    fn unregister(&self, project_id: &str) -> bool {
        self.retrievers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(project_id)
            .is_some()
    }

    /// Build and register the project's indexes unless already built in this process.
    ///
    /// # Errors
    ///
    /// Returns an error if the project is unknown to the document store, or if
    /// the semantic index cannot be built or persisted.
    pub async fn create_or_update(&self, project_id: &str) -> Result<BuildOutcome> {
        let lock = self.build_lock(project_id);
        let _guard = lock.lock().await;
        if self.is_registered(project_id) {
            return Ok(BuildOutcome::AlreadyBuilt);
        }
        self.build_locked(project_id).await
    }

    /// Drop the persisted index and the registration, then rebuild.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_or_update`], plus failure to delete the old index.
    pub async fn force_regenerate(&self, project_id: &str) -> Result<BuildOutcome> {
        let lock = self.build_lock(project_id);
        let _guard = lock.lock().await;
        self.semantic.clear(project_id).await?;
        self.unregister(project_id);
        tracing::info!(project_id, "regenerating index");
        self.build_locked(project_id).await
    }

    async fn build_locked(&self, project_id: &str) -> Result<BuildOutcome> {
        let summaries = self.store.list_documents(project_id).await?;
        let fetched = join_all(
            summaries
                .iter()
                .map(|s| fetch_with_retry(self.store.as_ref(), &s.id, self.fetch)),
        )
        .await;

        let mut documents = Vec::with_capacity(summaries.len());
        let mut texts = HashMap::new();
        for (summary, result) in summaries.iter().zip(fetched) {
            match result {
                Ok(full_text) => {
                    texts.insert(summary.id.clone(), full_text.clone());
                    documents.push(Document {
                        project_id: project_id.to_owned(),
                        document_id: summary.id.clone(),
                        title: summary.title.clone(),
                        full_text,
                    });
                }
                Err(e) => {
                    tracing::warn!(project_id, document_id = %summary.id, error = %e, "document skipped");
                }
            }
        }

        let chunks = self.splitter.split_all(&documents);
        if chunks.is_empty() {
            tracing::info!(
                project_id,
                listed = summaries.len(),
                "no indexable content"
            );
            return Ok(BuildOutcome::Empty);
        }

        let semantic = self.semantic.build(project_id, &chunks).await?;
        let lexical = LexicalIndex::from_sources(&chunks, &texts);
        let outcome = BuildOutcome::Built {
            documents: documents.len(),
            chunks: chunks.len(),
            degraded_entries: lexical.degraded_count(),
            lexical_available: lexical.is_available(),
        };
        self.register(self.retriever(project_id, semantic, lexical));
        tracing::info!(project_id, ?outcome, "index built");
        Ok(outcome)
    }

    fn retriever(
        &self,
        project_id: &str,
        semantic: crate::semantic::SemanticIndex,
        lexical: LexicalIndex,
    ) -> HybridRetriever {
        HybridRetriever::new(project_id, semantic, lexical, self.semantic.embed_fn())
            .with_embed_timeout(self.semantic.embed_timeout())
    }

    /// Return the registered retriever, or hydrate one from the persisted
    /// semantic index plus a fresh lexical index. `None` means not yet built.
    pub async fn load(&self, project_id: &str) -> Option<Arc<HybridRetriever>> {
        if let Some(existing) = self.get(project_id) {
            return Some(existing);
        }
        let lock = self.build_lock(project_id);
        let _guard = lock.lock().await;
        if let Some(existing) = self.get(project_id) {
            return Some(existing);
        }

        let semantic = self.semantic.load(project_id).await.into_index()?;
        let chunks = semantic.chunks();
        let lexical = LexicalIndex::hydrate(&chunks, self.store.as_ref(), self.fetch).await;
        tracing::info!(
            project_id,
            chunks = chunks.len(),
            degraded = lexical.degraded_count(),
            lexical_available = lexical.is_available(),
            "retriever hydrated from persisted index"
        );
        Some(self.register(self.retriever(project_id, semantic, lexical)))
    }

    /// Delete persisted semantic-index artifacts. The in-process registration is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the index directory cannot be removed.
    pub async fn clear(&self, project_id: &str) -> Result<bool> {
        self.semantic.clear(project_id).await
    }

    pub async fn validate(&self, project_id: &str) -> IndexReport {
        match self.semantic.load(project_id).await {
            LoadOutcome::Loaded(index) => IndexReport::Valid {
                entries: index.len(),
                dimensions: index.dimensions(),
            },
            LoadOutcome::NotFound => IndexReport::Missing {
                action: RepairAction::Regenerate,
            },
            LoadOutcome::Corrupt(reason) => IndexReport::Corrupt {
                reason,
                action: RepairAction::Regenerate,
            },
        }
    }

    /// True while a build, regenerate or load for `project_id` is in flight.
    #[must_use]
    pub fn is_busy(&self, project_id: &str) -> bool {
        self.build_lock(project_id).try_lock().is_err()
    }

    /// Wait up to `timeout` for an in-flight build of `project_id` to finish.
    pub async fn wait_idle(&self, project_id: &str, timeout: Duration) -> bool {
        let lock = self.build_lock(project_id);
        tokio::time::timeout(timeout, lock.lock()).await.is_ok()
    }
}
