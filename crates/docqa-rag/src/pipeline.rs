//! Startup-to-answer wiring: collaborators, index policy, and the query path.
use std::path::Path;

use tracing::{info, warn};

use docqa_core::data_processor::DataProcessor;
use docqa_core::error::{Error, Result};
use docqa_core::traits::{Embedder, Generator, TextExtractor};
use docqa_core::types::{QueryResponse, QueryResult};
use docqa_vector::VectorIndex;

use crate::answer::AnswerOrchestrator;
use crate::retriever::Retriever;

/// Collaborators created once at startup and owned by the pipeline.
pub struct Models {
    pub embedder: Box<dyn Embedder>,
    pub generator: Box<dyn Generator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPolicy {
    /// Reuse a complete index at the location, build one otherwise.
    LoadIfExists,
    /// Re-ingest the documents and replace whatever is at the location.
    Rebuild,
}

impl IndexPolicy {
    pub fn from_force_rebuild(force_rebuild: bool) -> Self {
        if force_rebuild { Self::Rebuild } else { Self::LoadIfExists }
    }
}

/// Where the documents for a build come from.
pub struct DocumentSource<'a> {
    pub dir: &'a Path,
    pub extractor: &'a dyn TextExtractor,
    pub processor: &'a DataProcessor,
    pub limit: Option<usize>,
}

/// Load or (re)build the index at `location` according to `policy`.
///
/// Documents are only read when a build is needed. An empty or missing
/// document folder stops with [`Error::NoDocuments`] before the index
/// location is touched.
pub fn prepare_index(
    location: &Path,
    policy: IndexPolicy,
    source: &DocumentSource<'_>,
    embedder: &dyn Embedder,
) -> Result<VectorIndex> {
    let existing = VectorIndex::exists(location)?;
    if policy == IndexPolicy::LoadIfExists && existing {
        info!("Loading existing index from {}", location.display());
        return VectorIndex::load(location);
    }

    info!("Ingesting documents from {}", source.dir.display());
    let chunks = source.processor.process_directory(source.dir, source.extractor, source.limit)?;
    if existing {
        info!("Rebuilding index at {} from {} chunks", location.display(), chunks.len());
        VectorIndex::rebuild(location, &chunks, embedder)
    } else {
        info!("Building index at {} from {} chunks", location.display(), chunks.len());
        VectorIndex::build(location, &chunks, embedder)
    }
}

pub struct RagPipeline {
    models: Models,
    index: VectorIndex,
    retriever: Retriever,
    orchestrator: AnswerOrchestrator,
}

impl RagPipeline {
    pub fn new(
        models: Models,
        index: VectorIndex,
        retriever: Retriever,
        orchestrator: AnswerOrchestrator,
    ) -> Self {
        Self { models, index, retriever, orchestrator }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn with_retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = retriever;
        self
    }

    /// Retrieve, then answer. Read-only with respect to the index.
    pub fn ask(&self, query_text: &str) -> Result<QueryResponse> {
        let retrieved = self.retrieve(query_text)?;
        let answer =
            self.orchestrator.answer(query_text, &retrieved, self.models.generator.as_ref())?;
        Ok(QueryResponse { answer, retrieved })
    }

    fn retrieve(&self, query_text: &str) -> Result<QueryResult> {
        match self.retriever.retrieve(&self.index, query_text, self.models.embedder.as_ref()) {
            Err(Error::EmptyIndex) => {
                warn!(
                    "Index at {} holds no chunks; answering without context",
                    self.index.location().display()
                );
                Ok(Vec::new())
            }
            other => other,
        }
    }
}
