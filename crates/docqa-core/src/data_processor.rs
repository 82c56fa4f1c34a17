//! Folder ingestion: find PDFs, extract their text, chunk them.
//!
//! Unusable files are logged and skipped; the batch only fails when nothing
//! usable is left.
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::chunker::{Chunker, ChunkingConfig};
use crate::error::{Error, Result};
use crate::traits::TextExtractor;
use crate::types::{Chunk, Document};

pub struct DataProcessor {
    chunker: Chunker,
}

impl DataProcessor {
    pub fn new(chunking_config: ChunkingConfig) -> Result<Self> {
        Ok(Self { chunker: Chunker::new(chunking_config)? })
    }

    pub fn with_chunker(chunker: Chunker) -> Self {
        Self { chunker }
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Ingest and chunk every usable PDF under `data_dir`.
    pub fn process_directory(
        &self,
        data_dir: &Path,
        extractor: &dyn TextExtractor,
        limit: Option<usize>,
    ) -> Result<Vec<Chunk>> {
        let documents = self.load_documents(data_dir, extractor, limit)?;
        let chunks = self.chunk_documents(&documents);
        info!("Processed {} documents into {} chunks", documents.len(), chunks.len());
        Ok(chunks)
    }

    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|doc| self.chunker.chunk(doc)).collect()
    }

    /// Extract text from every PDF under `data_dir`, sorted by path.
    ///
    /// Fails with [`Error::NoDocuments`] when the directory is missing or no
    /// file yields any text.
    pub fn load_documents(
        &self,
        data_dir: &Path,
        extractor: &dyn TextExtractor,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        if !data_dir.is_dir() {
            warn!("Folder not found: {}", data_dir.display());
            return Err(Error::NoDocuments(data_dir.to_path_buf()));
        }
        let mut files = list_pdf_files(data_dir);
        if files.is_empty() {
            return Err(Error::NoDocuments(data_dir.to_path_buf()));
        }
        if let Some(limit) = limit {
            if files.len() > limit {
                files.truncate(limit);
                info!("Limited to first {} files", limit);
            }
        }
        info!("Found {} PDF files in {}", files.len(), data_dir.display());

        let mut documents = Vec::with_capacity(files.len());
        for path in &files {
            match extractor.extract(path) {
                Ok(text) if text.trim().is_empty() => warn!("Empty PDF: {}", path.display()),
                Ok(text) => {
                    info!("Loaded {} ({} chars)", path.display(), text.chars().count());
                    documents.push(Document::new(path.to_string_lossy(), text));
                }
                Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
            }
        }
        if documents.is_empty() {
            return Err(Error::NoDocuments(data_dir.to_path_buf()));
        }
        info!("Successfully loaded {} PDF documents", documents.len());
        Ok(documents)
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn list_pdf_files(root: &Path) -> Vec<PathBuf> {
    let mut pdf_files = Vec::new();
    let files = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());
    for entry in files {
        let path = entry.path();
        if is_pdf(path) {
            pdf_files.push(path.to_path_buf());
        } else {
            warn!("Skipping non-PDF file: {}", path.display());
        }
    }
    pdf_files.sort();
    pdf_files
}
