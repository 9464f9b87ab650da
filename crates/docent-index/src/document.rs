use serde::{Deserialize, Serialize};

/// Number of leading characters of chunk text used for deduplication.
pub const FINGERPRINT_CHARS: usize = 50;

/// A source document as owned by the external document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub project_id: String,
    pub document_id: String,
    pub title: String,
    pub full_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
}

/// A bounded span of a document. Regenerated on every build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub project_id: String,
    pub title: String,
    pub text: String,
    pub position: usize,
}

impl Chunk {
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}#{}", self.document_id, self.position)
    }

    /// Deduplication key shared by the semantic and lexical candidate lists.
    #[must_use]
    pub fn dedup_key(&self) -> (String, String) {
        (self.document_id.clone(), fingerprint(&self.text))
    }
}

#[must_use]
pub fn fingerprint(text: &str) -> String {
    text.chars().take(FINGERPRINT_CHARS).collect()
}

/// A chunk paired with a raw engine score (cosine similarity or BM25).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}
