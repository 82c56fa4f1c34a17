use tracing::debug;

use docqa_core::error::{Error, Result};
use docqa_core::traits::{Embedder, VectorSearch};
use docqa_core::types::QueryResult;

pub const DEFAULT_K: usize = 5;

/// Embeds a query once and asks the index for the `k` most similar chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retriever {
    k: usize,
}

impl Default for Retriever {
    fn default() -> Self {
        Self { k: DEFAULT_K }
    }
}

impl Retriever {
    /// Fails with [`Error::InvalidConfig`] when `k` is zero.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::InvalidConfig("retrieval k must be at least 1".to_string()));
        }
        Ok(Self { k })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn retrieve(
        &self,
        index: &dyn VectorSearch,
        query_text: &str,
        embedder: &dyn Embedder,
    ) -> Result<QueryResult> {
        let query_vec = embedder
            .embed(query_text)
            .map_err(|e| Error::collaborator("embedding", &e))?;
        let result = index.search(&query_vec, self.k)?;
        debug!(
            "Retrieved {} chunks for query ({} chars)",
            result.len(),
            query_text.chars().count()
        );
        Ok(result)
    }
}
