use crate::document::{Chunk, Document};

/// Boundaries tried in order: paragraph, line, sentence, clause, word, character.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", ": ", "; ", ", ", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct SplitterConfig {
    /// Target maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters carried over between adjacent chunks of one document.
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 80,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChunkSplitter {
    config: SplitterConfig,
}

impl ChunkSplitter {
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> SplitterConfig {
        self.config
    }

    /// Split every document, keeping document order and per-document positions.
    #[must_use]
    pub fn split_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|d| self.split(d)).collect()
    }

    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.full_text)
            .into_iter()
            .enumerate()
            .map(|(position, text)| Chunk {
                document_id: document.document_id.clone(),
                project_id: document.project_id.clone(),
                title: document.title.clone(),
                text,
                position,
            })
            .collect()
    }

    /// Split raw text into trimmed, non-empty chunks.
    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let size = self.config.chunk_size.max(1);
        split_recursive(text, SEPARATORS, size, self.config.chunk_overlap)
            .into_iter()
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(text: &str, separators: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let idx = separators
        .iter()
        .position(|s| s.is_empty() || text.contains(s))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(idx).copied().unwrap_or("");
    let finer = separators.get(idx + 1..).unwrap_or(&[]);

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split_inclusive(separator).collect()
    };

    let mut out = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    for piece in pieces {
        if char_len(piece) <= size {
            pending.push(piece);
            continue;
        }
        if !pending.is_empty() {
            out.extend(merge_pieces(&pending, size, overlap));
            pending.clear();
        }
        if finer.is_empty() {
            out.push(piece.to_owned());
        } else {
            out.extend(split_recursive(piece, finer, size, overlap));
        }
    }
    if !pending.is_empty() {
        out.extend(merge_pieces(&pending, size, overlap));
    }
    out
}

/// Greedily pack pieces into windows of at most `size` characters, seeding each
/// new window with up to `overlap` trailing characters of the previous one.
fn merge_pieces(pieces: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window = String::new();
    let mut total = 0;
    // The window holds more than the carried-over tail.
    let mut fresh = false;

    for piece in pieces {
        let len = char_len(piece);
        if total + len > size && fresh {
            let carry = overlap_tail(&window, overlap.min(size.saturating_sub(len))).to_owned();
            total = char_len(&carry);
            chunks.push(std::mem::replace(&mut window, carry));
            fresh = false;
        }
        window.push_str(piece);
        total += len;
        fresh = true;
    }

    if fresh {
        chunks.push(window);
    }
    chunks
}

/// Last `budget` characters of `text`, starting at a word boundary when one
/// falls inside that span.
fn overlap_tail(text: &str, budget: usize) -> &str {
    if budget == 0 {
        return "";
    }
    let count = char_len(text);
    let start = text
        .char_indices()
        .nth(count.saturating_sub(budget))
        .map_or(text.len(), |(i, _)| i);
    let tail = &text[start..];
    let mid_word = text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace());
    if mid_word && let Some(ws) = tail.find(char::is_whitespace) {
        return tail[ws..].trim_start();
    }
    tail.trim_start()
}
