//! In-process BM25 index over a chunk corpus, hydrated from authoritative document text.

use std::collections::HashMap;

use futures::future::join_all;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{
    Field, INDEXED, IndexRecordOption, STORED, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, doc};

use crate::document::{Chunk, ScoredChunk};
use crate::error::{IndexError, Result};
use crate::store::{DocumentStore, FetchPolicy, fetch_with_retry};

const TOKENIZER: &str = "docent_text";
const WRITER_HEAP_BYTES: usize = 15_000_000;

pub(crate) const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with", "or", "but", "not", "this",
    "these", "they", "them", "their", "there", "then", "than", "so", "if", "when", "where", "why",
    "how", "what", "which", "who", "whom", "whose", "can", "could", "should", "would", "may",
    "might", "must", "shall", "do", "does", "did", "have", "had", "having", "about", "into", "you",
    "your", "our", "we", "i", "me", "my", "all", "any", "tell", "please",
];

#[derive(Debug, Clone)]
pub struct LexicalEntry {
    pub chunk: Chunk,
    /// Indexed from the chunk's own text because the source document could not be fetched.
    pub degraded: bool,
}

struct Bm25 {
    index: Index,
    reader: IndexReader,
    body: Field,
    entry: Field,
}

enum State {
    Ready(Box<Bm25>),
    Unavailable(String),
}

pub struct LexicalIndex {
    state: State,
    entries: Vec<LexicalEntry>,
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("available", &self.is_available())
            .field("entries", &self.entries.len())
            .field("degraded", &self.degraded_count())
            .finish()
    }
}

impl LexicalIndex {
    /// Fetch each source document once, concurrently, and build from the results.
    ///
    /// Individual fetch failures degrade the affected entries. If no fetch
    /// succeeds the index is marked unavailable instead of failing.
    pub async fn hydrate(
        chunks: &[Chunk],
        store: &dyn DocumentStore,
        policy: FetchPolicy,
    ) -> Self {
        let mut ids: Vec<&str> = Vec::new();
        for chunk in chunks {
            if !ids.contains(&chunk.document_id.as_str()) {
                ids.push(&chunk.document_id);
            }
        }

        let fetched = join_all(ids.iter().map(|id| fetch_with_retry(store, id, policy))).await;

        let mut texts = HashMap::new();
        for (id, result) in ids.iter().zip(fetched) {
            match result {
                Ok(text) => {
                    texts.insert((*id).to_owned(), text);
                }
                Err(e) => {
                    tracing::warn!(document_id = *id, error = %e, "full-text fetch failed, using chunk text");
                }
            }
        }

        Self::from_sources(chunks, &texts)
    }

    /// Build from already-fetched full texts keyed by document id.
    #[must_use]
    pub fn from_sources(chunks: &[Chunk], texts: &HashMap<String, String>) -> Self {
        if chunks.is_empty() {
            return Self::unavailable("empty corpus", Vec::new());
        }

        let mut bodies = Vec::with_capacity(chunks.len());
        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let full = texts.get(&chunk.document_id);
            let body = match full {
                Some(text) => format!("{}\n{text}", chunk.title),
                None => format!("{}\n{}", chunk.title, chunk.text),
            };
            bodies.push(body);
            entries.push(LexicalEntry {
                chunk: chunk.clone(),
                degraded: full.is_none(),
            });
        }

        if entries.iter().all(|e| e.degraded) {
            tracing::warn!(
                chunks = entries.len(),
                "no source document could be fetched, lexical index unavailable"
            );
            return Self::unavailable("all document fetches failed", entries);
        }

        match build_bm25(&bodies) {
            Ok(bm25) => {
                let index = Self {
                    state: State::Ready(Box::new(bm25)),
                    entries,
                };
                tracing::debug!(
                    entries = index.entries.len(),
                    degraded = index.degraded_count(),
                    "lexical index built"
                );
                index
            }
            Err(e) => {
                tracing::warn!(error = %e, "lexical index build failed");
                Self::unavailable(&e.to_string(), entries)
            }
        }
    }

    fn unavailable(reason: &str, entries: Vec<LexicalEntry>) -> Self {
        Self {
            state: State::Unavailable(reason.to_owned()),
            entries,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    #[must_use]
    pub fn entries(&self) -> &[LexicalEntry] {
        &self.entries
    }

    #[must_use]
    pub fn degraded_count(&self) -> usize {
        self.entries.iter().filter(|e| e.degraded).count()
    }

    /// BM25 search returning chunks with raw scores, best first.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::LexicalUnavailable`] on an unavailable index, or a
    /// tantivy error if the search itself fails.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        let bm25 = match &self.state {
            State::Ready(bm25) => bm25,
            State::Unavailable(reason) => {
                return Err(IndexError::LexicalUnavailable(reason.clone()));
            }
        };
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parser = QueryParser::for_index(&bm25.index, vec![bm25.body]);
        let (parsed, errors) = parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "lenient query parse dropped clauses");
        }

        let searcher = bm25.reader.searcher();
        let limit = limit.min(self.entries.len());
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let Some(idx) = doc
                .get_first(bm25.entry)
                .and_then(|v| v.as_u64())
                .and_then(|v| usize::try_from(v).ok())
            else {
                continue;
            };
            if let Some(entry) = self.entries.get(idx) {
                hits.push(ScoredChunk {
                    chunk: entry.chunk.clone(),
                    score,
                });
            }
        }
        Ok(hits)
    }
}

fn build_bm25(bodies: &[String]) -> tantivy::Result<Bm25> {
    let mut builder = Schema::builder();
    let indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let body = builder.add_text_field("body", TextOptions::default().set_indexing_options(indexing));
    let entry = builder.add_u64_field("entry", STORED | INDEXED);
    let schema = builder.build();

    let index = Index::create_in_ram(schema);
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(
            STOP_WORDS.iter().map(|s| (*s).to_owned()),
        ))
        .build();
    index.tokenizers().register(TOKENIZER, analyzer);

    let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
    for (i, text) in bodies.iter().enumerate() {
        writer.add_document(doc!(body => text.as_str(), entry => i as u64))?;
    }
    writer.commit()?;

    let reader = index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()?;

    Ok(Bm25 {
        index,
        reader,
        body,
        entry,
    })
}
