//! Persistent vector index with exhaustive cosine search.
//!
//! An index lives in one LanceDB directory (`location`). Builds are always
//! written to a staging sibling first and renamed into place, so `location`
//! only ever holds a complete index. A rebuild moves the previous index to
//! `<name>.retired` for the duration of the swap; `load` and `exists` put it
//! back if the process died between the two renames.
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use docqa_core::error::{Error, Result};
use docqa_core::traits::{Embedder, VectorSearch};
use docqa_core::types::{l2_norm, Chunk, EmbeddingRecord, QueryResult, ScoredChunk};

use crate::schema::{build_chunks_schema, CHUNKS_TABLE};
use crate::table::{
    count_rows, create_table, has_table, open_db, read_meta, read_records, records_to_batch,
    write_meta,
};
use crate::writer::embed_chunks;

#[derive(Debug, Clone)]
pub struct VectorIndex {
    location: PathBuf,
    records: Vec<EmbeddingRecord>,
    dim: usize,
}

struct IndexMeta {
    chunk_count: usize,
    dim: usize,
}

impl VectorIndex {
    /// A handle that was never built. Searching it fails with [`Error::EmptyIndex`].
    pub fn empty(location: impl Into<PathBuf>) -> Self {
        Self { location: location.into(), records: Vec::new(), dim: 0 }
    }

    /// Embed `chunks` and persist them at `location`.
    ///
    /// Refuses to overwrite a complete index; use [`VectorIndex::rebuild`] for that.
    pub fn build(location: &Path, chunks: &[Chunk], embedder: &dyn Embedder) -> Result<Self> {
        if Self::exists(location)? {
            return Err(Error::Storage(format!(
                "an index already exists at {}",
                location.display()
            )));
        }
        let records = embed_chunks(chunks, embedder)?;
        let staging = stage(location, &records, embedder.dim())?;
        if location.exists() {
            warn!("Removing incomplete index at {}", location.display());
            fs::remove_dir_all(location)?;
        }
        fs::rename(staging.path(), location)?;
        info!("Built index at {} ({} chunks)", location.display(), records.len());
        Ok(Self { location: location.to_path_buf(), records, dim: embedder.dim() })
    }

    /// Read a previously built index. Nothing is embedded.
    pub fn load(location: &Path) -> Result<Self> {
        recover_interrupted_swap(location)?;
        if !location.is_dir() {
            return Err(Error::IndexNotFound(location.to_path_buf()));
        }
        let uri = location.to_string_lossy().into_owned();
        let loaded = block_on(async move {
            let conn = open_db(&uri).await?;
            let Some(meta) = inspect(&conn).await? else { return Ok(None) };
            let records = read_records(&conn, meta.chunk_count).await?;
            Ok::<_, anyhow::Error>(Some((meta, records)))
        })?;
        let Some((meta, records)) = loaded else {
            return Err(Error::IndexNotFound(location.to_path_buf()));
        };
        if let Some(bad) = records.iter().find(|r| r.vector.len() != meta.dim) {
            return Err(Error::Storage(format!(
                "record {} has {} dimensions, index declares {}",
                bad.id,
                bad.vector.len(),
                meta.dim
            )));
        }
        info!(
            "Loaded index from {} ({} chunks, dim={})",
            location.display(),
            records.len(),
            meta.dim
        );
        Ok(Self { location: location.to_path_buf(), records, dim: meta.dim })
    }

    /// Build a fresh index in staging, then swap it in for whatever is at `location`.
    pub fn rebuild(location: &Path, chunks: &[Chunk], embedder: &dyn Embedder) -> Result<Self> {
        recover_interrupted_swap(location)?;
        let records = embed_chunks(chunks, embedder)?;
        let staging = stage(location, &records, embedder.dim())?;
        swap_into_place(staging.path(), location)?;
        info!("Rebuilt index at {} ({} chunks)", location.display(), records.len());
        Ok(Self { location: location.to_path_buf(), records, dim: embedder.dim() })
    }

    /// True when a complete index is persisted at `location`.
    pub fn exists(location: &Path) -> Result<bool> {
        recover_interrupted_swap(location)?;
        if !location.is_dir() {
            return Ok(false);
        }
        let uri = location.to_string_lossy().into_owned();
        block_on(async move {
            let conn = open_db(&uri).await?;
            Ok::<_, anyhow::Error>(inspect(&conn).await?.is_some())
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn chunk_count(&self) -> usize {
        self.records.len()
    }

    /// Exhaustive cosine search. Results are ordered by descending score,
    /// then ascending `chunk_index`, then `source_id`.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Result<QueryResult> {
        if self.records.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if query_vec.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query_vec.len() });
        }
        let q_norm = l2_norm(query_vec);
        let mut scored: Vec<ScoredChunk> = self
            .records
            .iter()
            .map(|r| ScoredChunk {
                chunk: r.chunk.clone(),
                score: cosine(query_vec, q_norm, &r.vector, r.norm),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
                .then_with(|| a.chunk.source_id.cmp(&b.chunk.source_id))
        });
        scored.truncate(k.min(self.records.len()));
        debug!("Search returned {} of {} chunks", scored.len(), self.records.len());
        Ok(scored)
    }
}

impl VectorSearch for VectorIndex {
    fn chunk_count(&self) -> usize {
        VectorIndex::chunk_count(self)
    }

    fn search(&self, query_vec: &[f32], k: usize) -> Result<QueryResult> {
        VectorIndex::search(self, query_vec, k)
    }
}

fn cosine(q: &[f32], q_norm: f32, v: &[f32], v_norm: f32) -> f32 {
    if q_norm == 0.0 || v_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = q.iter().zip(v).map(|(a, b)| a * b).sum();
    dot / (q_norm * v_norm)
}

/// Sibling that holds the previous index while a rebuild swaps directories.
pub fn retired_path(location: &Path) -> PathBuf {
    location.with_file_name(format!("{}.retired", dir_name(location)))
}

fn dir_name(location: &Path) -> String {
    location.file_name().map_or_else(|| "index".to_string(), |n| n.to_string_lossy().into_owned())
}

// Valid only when meta was written and agrees with the chunks table.
async fn inspect(conn: &lancedb::Connection) -> anyhow::Result<Option<IndexMeta>> {
    let Some(meta) = read_meta(conn).await? else { return Ok(None) };
    if !has_table(conn, CHUNKS_TABLE).await? {
        return Ok(None);
    }
    let field = |key: &str| -> anyhow::Result<usize> {
        let raw = meta.get(key).ok_or_else(|| anyhow::anyhow!("meta is missing {key}"))?;
        raw.parse().map_err(|e| anyhow::anyhow!("meta {key}={raw:?}: {e}"))
    };
    let chunk_count = field("chunk_count")?;
    let dim = field("dim")?;
    let rows = count_rows(conn, CHUNKS_TABLE).await?;
    if rows != chunk_count {
        warn!("Index meta declares {} chunks but table holds {}", chunk_count, rows);
        return Ok(None);
    }
    Ok(Some(IndexMeta { chunk_count, dim }))
}

fn stage(location: &Path, records: &[EmbeddingRecord], dim: usize) -> Result<TempDir> {
    let parent = match location.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{}.staging-", dir_name(location)))
        .tempdir_in(&parent)?;
    debug!("Staging index in {}", staging.path().display());

    let dim_i32 =
        i32::try_from(dim).map_err(|_| Error::Storage(format!("dimension {dim} is too large")))?;
    let uri = staging.path().to_string_lossy().into_owned();
    let batch = if records.is_empty() {
        None
    } else {
        let batch =
            records_to_batch(records, dim_i32).map_err(|e| Error::storage(format!("{e:#}")))?;
        Some(batch)
    };
    let chunk_count = records.len();
    block_on(async move {
        let conn = open_db(&uri).await?;
        create_table(&conn, CHUNKS_TABLE, build_chunks_schema(dim_i32), batch).await?;
        let written = count_rows(&conn, CHUNKS_TABLE).await?;
        anyhow::ensure!(written == chunk_count, "wrote {written} rows, expected {chunk_count}");
        write_meta(
            &conn,
            &[
                ("chunk_count", chunk_count.to_string()),
                ("dim", dim.to_string()),
                ("created_at", chrono::Utc::now().to_rfc3339()),
            ],
        )
        .await
    })?;
    Ok(staging)
}

fn swap_into_place(staged: &Path, location: &Path) -> Result<()> {
    if !location.exists() {
        fs::rename(staged, location)?;
        return Ok(());
    }
    let retired = retired_path(location);
    fs::rename(location, &retired)?;
    fs::rename(staged, location)?;
    if let Err(e) = fs::remove_dir_all(&retired) {
        warn!("Could not remove retired index {}: {}", retired.display(), e);
    }
    Ok(())
}

fn recover_interrupted_swap(location: &Path) -> Result<()> {
    let retired = retired_path(location);
    if !retired.exists() {
        return Ok(());
    }
    if location.exists() {
        debug!("Removing leftover {}", retired.display());
        fs::remove_dir_all(&retired)?;
    } else {
        warn!("Restoring index from {} after an interrupted rebuild", retired.display());
        fs::rename(&retired, location)?;
    }
    Ok(())
}

fn block_on<T>(fut: impl Future<Output = anyhow::Result<T>>) -> Result<T> {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    rt.block_on(fut).map_err(|e| Error::storage(format!("{e:#}")))
}
