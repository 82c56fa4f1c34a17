use std::path::Path;

use crate::error::Result;
use crate::types::QueryResult;

/// Text to fixed-dimension vector. Implementations should return L2-normalized vectors.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Prompt to completion.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Reduces one file on disk to its raw text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> anyhow::Result<String>;
}

/// Read side of a vector index.
pub trait VectorSearch: Send + Sync {
    fn chunk_count(&self) -> usize;
    fn search(&self, query_vec: &[f32], k: usize) -> Result<QueryResult>;
}
