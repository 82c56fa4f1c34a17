//! Domain types shared by the chunker, the vector index and the answer path.

use serde::{Deserialize, Serialize};

/// Raw text of one ingested file. Discarded once it has been chunked.
///
/// `source_id` is the path the text was extracted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source_id: String,
    pub raw_text: String,
}

impl Document {
    pub fn new(source_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self { source_id: source_id.into(), raw_text: raw_text.into() }
    }
}

/// A bounded substring of a source document, the unit of embedding and retrieval.
///
/// - `source_id`: the document the text came from
/// - `chunk_index`: position within that document, left to right, starting at 0
/// - `text`: the chunk payload, including any overlap carried from the previous chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_id: String,
    pub chunk_index: usize,
    pub text: String,
}

impl Chunk {
    pub fn id(&self) -> String {
        format!("{}#{}", self.source_id, self.chunk_index)
    }
}

/// A chunk together with its embedding, as persisted in the index.
///
/// `norm` is the L2 norm of `vector`; it is 1.0 when the embedder normalizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub norm: f32,
}

impl EmbeddingRecord {
    pub fn new(id: String, chunk: Chunk, vector: Vec<f32>) -> Self {
        let norm = l2_norm(&vector);
        Self { id, chunk, vector, norm }
    }
}

/// One entry of a query result. Higher `score` is more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Retrieved chunks, best first.
pub type QueryResult = Vec<ScoredChunk>;

/// Generated answer with the documents it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
}

/// Everything a query produces: the answer plus the raw retrieved chunks for display.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub answer: Answer,
    pub retrieved: QueryResult,
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
