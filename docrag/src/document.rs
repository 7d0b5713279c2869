//! Data types for documents, chunks, retrieval results, and answers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of content a chunk was derived from.
///
/// Parsers normalize everything to text; the modality records what the
/// text originally was so callers can render citations appropriately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Ordinary prose.
    Text,
    /// Text linearized from tabular data.
    Table,
    /// Text derived from an embedded image (captions, alt text, OCR).
    Image,
}

/// A parsed source document.
///
/// Documents are an intermediate product of parsing: they are chunked
/// immediately and not retained afterwards except by reference through
/// [`Chunk::document_id`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// Source path or file name the document was parsed from.
    pub source: String,
    /// The normalized text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
    /// When the document was ingested.
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document with a fresh identifier and the current timestamp.
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            text: text.into(),
            metadata: HashMap::new(),
            ingested_at: Utc::now(),
        }
    }
}

/// The smallest retrievable unit of document content.
///
/// Invariants: `text` is non-empty and `id` is unique within an index.
/// `ordinal` is the chunk's position within its parent document and is
/// used as the deterministic tie-break in retrieval ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk within its parent document.
    pub ordinal: usize,
    /// The text content of the chunk.
    pub text: String,
    /// What the text was derived from.
    pub modality: Modality,
    /// Key-value metadata inherited from the parent document plus
    /// chunk-specific fields (source file, page number, header path).
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Create a chunk belonging to `document` at the given ordinal.
    ///
    /// The chunk ID is derived as `{document_id}:{ordinal}`.
    pub fn new(document: &Document, ordinal: usize, text: impl Into<String>, modality: Modality) -> Self {
        Self {
            id: format!("{}:{ordinal}", document.id),
            document_id: document.id.clone(),
            ordinal,
            text: text.into(),
            modality,
            metadata: document.metadata.clone(),
        }
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// An ordered retrieval result: chunks by descending score, ties broken
/// by `(document_id, ordinal)`.
///
/// Produced fresh per query, never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Retrieved {
    /// The scored chunks, best first.
    pub results: Vec<ScoredChunk>,
}

impl Retrieved {
    /// Number of retrieved chunks.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A generated answer together with the retrieval it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// The model's response text.
    pub text: String,
    /// The retrieved chunks the answer was grounded on, so callers can
    /// render citations.
    pub sources: Retrieved,
    /// Whether low-scored chunks were dropped to fit the context budget.
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_derive_from_document_and_ordinal() {
        let doc = Document::new("report.md", "hello world");
        let chunk = Chunk::new(&doc, 3, "hello", Modality::Text);
        assert_eq!(chunk.id, format!("{}:3", doc.id));
        assert_eq!(chunk.document_id, doc.id);
        assert_eq!(chunk.ordinal, 3);
    }

    #[test]
    fn modality_serializes_lowercase() {
        let json = serde_json::to_string(&Modality::Table).unwrap();
        assert_eq!(json, "\"table\"");
    }
}
