//! Per-project hybrid retrieval: chunking, semantic and BM25 indexes, score fusion,
//! relevance filtering, and index lifecycle management.

pub mod document;
pub mod error;
pub mod fusion;
pub mod lexical;
pub mod registry;
pub mod relevance;
pub mod retriever;
pub mod semantic;
pub mod splitter;
pub mod store;

use std::sync::Arc;

use docent_llm::EmbedFuture;

pub use document::{Chunk, Document, DocumentSummary, ScoredChunk};
pub use error::{IndexError, Result, StoreError};
pub use fusion::{Provenance, ResultMetadata, RetrievalResult, Weights};
pub use registry::{BuildOutcome, IndexRegistry, IndexReport, RegistryConfig, RepairAction};
pub use lexical::LexicalIndex;
pub use retriever::HybridRetriever;
pub use semantic::{LoadOutcome, SemanticIndex, SemanticStore};
pub use splitter::{ChunkSplitter, SplitterConfig};
pub use store::{DocumentStore, FetchPolicy, FsDocumentStore, InMemoryDocumentStore};

/// Shared embedding callback, usually produced by `AnyProvider::embed_fn`.
pub type EmbedFn = Arc<dyn Fn(&str) -> EmbedFuture + Send + Sync>;
