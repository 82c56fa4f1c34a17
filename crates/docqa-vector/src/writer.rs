//! Turns chunks into embedding records, one `embed` call per chunk.
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use docqa_core::error::{Error, Result};
use docqa_core::traits::Embedder;
use docqa_core::types::{Chunk, EmbeddingRecord};

/// Opaque, stable record id for a chunk.
pub fn record_id(chunk: &Chunk) -> String {
    blake3::hash(chunk.id().as_bytes()).to_hex().to_string()
}

/// Embed every chunk, checking each vector against `embedder.dim()`.
pub fn embed_chunks(chunks: &[Chunk], embedder: &dyn Embedder) -> Result<Vec<EmbeddingRecord>> {
    let dim = embedder.dim();
    info!("Embedding {} chunks (dim={})", chunks.len(), dim);
    let pb = ProgressBar::new(chunks.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(concat!(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] ",
        "{pos}/{len} chunks ({percent}%) {msg}"
    )) {
        pb.set_style(style.progress_chars("#>-"));
    }
    let mut records = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let vector =
            embedder.embed(&chunk.text).map_err(|e| Error::collaborator("embedding", &e))?;
        if vector.len() != dim {
            pb.abandon();
            return Err(Error::DimensionMismatch { expected: dim, actual: vector.len() });
        }
        records.push(EmbeddingRecord::new(record_id(chunk), chunk.clone(), vector));
        pb.inc(1);
    }
    pb.finish_with_message("embedded");
    Ok(records)
}
