//! Embedding-backed vector index, persisted as one directory per project.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};

use crate::EmbedFn;
use crate::document::{Chunk, ScoredChunk};
use crate::error::{IndexError, Result};

const FORMAT_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const ENTRIES_FILE: &str = "entries.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    project_id: String,
    dimensions: usize,
    entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct SemanticIndex {
    project_id: String,
    dimensions: usize,
    entries: Vec<SemanticEntry>,
}

impl SemanticIndex {
    #[must_use]
    pub fn from_entries(project_id: impl Into<String>, entries: Vec<SemanticEntry>) -> Self {
        let dimensions = entries.first().map_or(0, |e| e.vector.len());
        Self {
            project_id: project_id.into(),
            dimensions,
            entries,
        }
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn chunks(&self) -> Vec<Chunk> {
        self.entries.iter().map(|e| e.chunk.clone()).collect()
    }

    /// Brute-force cosine search. Ties keep index order.
    #[must_use]
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit);
        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }
}

/// Result of reading a persisted index. Never an error: callers treat anything
/// other than `Loaded` as "not yet initialized".
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(SemanticIndex),
    NotFound,
    Corrupt(String),
}

impl LoadOutcome {
    #[must_use]
    pub fn into_index(self) -> Option<SemanticIndex> {
        match self {
            Self::Loaded(index) => Some(index),
            Self::NotFound | Self::Corrupt(_) => None,
        }
    }
}

/// Builds, persists, and loads semantic indexes under a root directory.
#[derive(Clone)]
pub struct SemanticStore {
    root: PathBuf,
    embed_fn: EmbedFn,
    concurrency: usize,
    embed_timeout: Duration,
}

impl std::fmt::Debug for SemanticStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticStore")
            .field("root", &self.root)
            .field("concurrency", &self.concurrency)
            .field("embed_timeout", &self.embed_timeout)
            .finish_non_exhaustive()
    }
}

impl SemanticStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, embed_fn: EmbedFn) -> Self {
        Self {
            root: root.into(),
            embed_fn,
            concurrency: 4,
            embed_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    #[must_use]
    pub fn embed_fn(&self) -> EmbedFn {
        std::sync::Arc::clone(&self.embed_fn)
    }

    #[must_use]
    pub fn embed_timeout(&self) -> Duration {
        self.embed_timeout
    }

    /// Stable on-disk location for a project's index.
    #[must_use]
    pub fn index_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(dir_name(project_id))
    }

    #[must_use]
    pub fn exists(&self, project_id: &str) -> bool {
        self.index_dir(project_id).is_dir()
    }

    /// Embed every chunk and persist the result.
    ///
    /// Chunks whose embedding fails or has the wrong dimension are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if no chunk could be embedded or the index cannot be written.
    pub async fn build(&self, project_id: &str, chunks: &[Chunk]) -> Result<SemanticIndex> {
        let results: Vec<(Chunk, Result<Vec<f32>>)> = stream::iter(chunks.iter().cloned())
            .map(|chunk| async move {
                let vector = embed_with_timeout(&self.embed_fn, &chunk.text, self.embed_timeout)
                    .await;
                (chunk, vector)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut entries = Vec::with_capacity(results.len());
        let mut last_error = None;
        for (chunk, result) in results {
            match result {
                Ok(vector) => entries.push(SemanticEntry { chunk, vector }),
                Err(e) => {
                    tracing::warn!(project_id, chunk = %chunk.id(), error = %e, "embedding failed, chunk skipped");
                    last_error = Some(e);
                }
            }
        }

        let dimensions = entries.first().map_or(0, |e| e.vector.len());
        let before = entries.len();
        entries.retain(|e| e.vector.len() == dimensions && dimensions > 0);
        if entries.len() < before {
            tracing::warn!(
                project_id,
                dropped = before - entries.len(),
                "embeddings with inconsistent dimensions dropped"
            );
        }

        if entries.is_empty() && !chunks.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                IndexError::Other(format!("no usable embeddings for project {project_id}"))
            }));
        }

        let index = SemanticIndex::from_entries(project_id, entries);
        self.persist(&index).await?;
        tracing::info!(
            project_id,
            entries = index.len(),
            dimensions = index.dimensions(),
            "semantic index built"
        );
        Ok(index)
    }

    async fn persist(&self, index: &SemanticIndex) -> Result<()> {
        let dir = self.index_dir(&index.project_id);
        tokio::fs::create_dir_all(&dir).await?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            project_id: index.project_id.clone(),
            dimensions: index.dimensions,
            entries: index.entries.len(),
        };
        write_atomic(&dir.join(ENTRIES_FILE), &serde_json::to_vec(&index.entries)?).await?;
        // Manifest goes last: its presence marks a complete index.
        write_atomic(&dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?).await?;
        Ok(())
    }

    pub async fn load(&self, project_id: &str) -> LoadOutcome {
        let dir = self.index_dir(project_id);
        if !dir.is_dir() {
            return LoadOutcome::NotFound;
        }
        match read_index(&dir, project_id).await {
            Ok(index) => LoadOutcome::Loaded(index),
            Err(reason) => {
                tracing::warn!(project_id, %reason, "persisted semantic index unreadable");
                LoadOutcome::Corrupt(reason)
            }
        }
    }

    /// Delete a project's persisted index. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub async fn clear(&self, project_id: &str) -> Result<bool> {
        let dir = self.index_dir(project_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(project_id, "semantic index cleared");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Embed a query string under the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding call fails or times out.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        embed_with_timeout(&self.embed_fn, text, self.embed_timeout).await
    }
}

pub(crate) async fn embed_with_timeout(
    embed_fn: &EmbedFn,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>> {
    match tokio::time::timeout(timeout, embed_fn(text)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(IndexError::Timeout(timeout.as_secs())),
    }
}

async fn read_index(dir: &Path, project_id: &str) -> std::result::Result<SemanticIndex, String> {
    let manifest_raw = tokio::fs::read(dir.join(MANIFEST_FILE))
        .await
        .map_err(|e| format!("manifest unreadable: {e}"))?;
    let manifest: Manifest =
        serde_json::from_slice(&manifest_raw).map_err(|e| format!("manifest invalid: {e}"))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(format!(
            "unsupported format version {}",
            manifest.format_version
        ));
    }
    if manifest.project_id != project_id {
        return Err(format!(
            "manifest belongs to project {}",
            manifest.project_id
        ));
    }

    let entries_raw = tokio::fs::read(dir.join(ENTRIES_FILE))
        .await
        .map_err(|e| format!("entries unreadable: {e}"))?;
    let entries: Vec<SemanticEntry> =
        serde_json::from_slice(&entries_raw).map_err(|e| format!("entries invalid: {e}"))?;
    if entries.len() != manifest.entries {
        return Err(format!(
            "expected {} entries, found {}",
            manifest.entries,
            entries.len()
        ));
    }
    if entries.iter().any(|e| e.vector.len() != manifest.dimensions) {
        return Err("vector dimensions disagree with manifest".into());
    }

    Ok(SemanticIndex {
        project_id: project_id.to_owned(),
        dimensions: manifest.dimensions,
        entries,
    })
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Filesystem-safe directory name, suffixed with a hash so distinct ids never collide.
fn dir_name(project_id: &str) -> String {
    let safe: String = project_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    let hash = blake3::hash(project_id.as_bytes()).to_hex();
    format!("{safe}-{}", &hash[..12])
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
