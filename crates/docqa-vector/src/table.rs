//! LanceDB connection helpers and the mapping between Arrow rows and
//! [`EmbeddingRecord`]s.
//!
//! Everything here is async and returns `anyhow::Result`; the index module
//! drives it on a runtime and converts failures to storage errors.
use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{ArrowError, Schema};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::collections::HashMap;
use std::sync::Arc;

use docqa_core::types::{Chunk, EmbeddingRecord};

use crate::schema::{build_chunks_schema, build_meta_schema, CHUNKS_TABLE, META_TABLE};

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn has_table(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn create_table(
    conn: &Connection,
    name: &str,
    schema: Arc<Schema>,
    batch: Option<RecordBatch>,
) -> Result<()> {
    // an empty iterator creates the table with 0 rows
    let batches: Vec<std::result::Result<RecordBatch, ArrowError>> =
        batch.into_iter().map(Ok).collect();
    let iter = RecordBatchIterator::new(batches.into_iter(), schema);
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

pub async fn count_rows(conn: &Connection, name: &str) -> Result<usize> {
    let t = conn.open_table(name).execute().await?;
    Ok(t.count_rows(None).await?)
}

pub async fn write_meta(conn: &Connection, entries: &[(&str, String)]) -> Result<()> {
    let keys: Vec<String> = entries.iter().map(|(k, _)| (*k).to_string()).collect();
    let values: Vec<String> = entries.iter().map(|(_, v)| v.clone()).collect();
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![Arc::new(StringArray::from(keys)), Arc::new(StringArray::from(values))],
    )?;
    create_table(conn, META_TABLE, build_meta_schema(), Some(rb)).await
}

/// All key/value pairs of the meta table, or `None` when it was never written.
pub async fn read_meta(conn: &Connection) -> Result<Option<HashMap<String, String>>> {
    if !has_table(conn, META_TABLE).await? {
        return Ok(None);
    }
    let t = conn.open_table(META_TABLE).execute().await?;
    let mut meta = HashMap::new();
    let mut stream = t.query().execute().await?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        let keys = column::<StringArray>(&batch, "key")?;
        let values = column::<StringArray>(&batch, "value")?;
        for i in 0..batch.num_rows() {
            meta.insert(keys.value(i).to_string(), values.value(i).to_string());
        }
    }
    Ok(Some(meta))
}

pub fn records_to_batch(records: &[EmbeddingRecord], dim: i32) -> Result<RecordBatch> {
    let mut ids = Vec::with_capacity(records.len());
    let mut source_ids = Vec::with_capacity(records.len());
    let mut chunk_indices = Vec::with_capacity(records.len());
    let mut texts = Vec::with_capacity(records.len());
    let mut norms = Vec::with_capacity(records.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
    for r in records {
        ids.push(r.id.clone());
        source_ids.push(r.chunk.source_id.clone());
        chunk_indices.push(i64::try_from(r.chunk.chunk_index)?);
        texts.push(r.chunk.text.clone());
        norms.push(r.norm);
        vectors.push(Some(r.vector.iter().map(|&x| Some(x)).collect()));
    }
    let vectors =
        FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim);
    let record_batch = RecordBatch::try_new(
        build_chunks_schema(dim),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(source_ids)),
            Arc::new(Int64Array::from(chunk_indices)),
            Arc::new(StringArray::from(texts)),
            Arc::new(Float32Array::from(norms)),
            Arc::new(vectors),
        ],
    )?;
    Ok(record_batch)
}

/// Read `rows` records back from the chunks table.
pub async fn read_records(conn: &Connection, rows: usize) -> Result<Vec<EmbeddingRecord>> {
    let mut records = Vec::with_capacity(rows);
    if rows == 0 {
        return Ok(records);
    }
    let t = conn.open_table(CHUNKS_TABLE).execute().await?;
    let mut stream = t.query().limit(rows).execute().await?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        let ids = column::<StringArray>(&batch, "id")?;
        let source_ids = column::<StringArray>(&batch, "source_id")?;
        let chunk_indices = column::<Int64Array>(&batch, "chunk_index")?;
        let texts = column::<StringArray>(&batch, "text")?;
        let norms = column::<Float32Array>(&batch, "norm")?;
        let vectors = column::<FixedSizeListArray>(&batch, "vector")?;
        for i in 0..batch.num_rows() {
            let arr = vectors.value(i);
            let vector = arr.as_primitive::<Float32Type>().values().to_vec();
            records.push(EmbeddingRecord {
                id: ids.value(i).to_string(),
                chunk: Chunk {
                    source_id: source_ids.value(i).to_string(),
                    chunk_index: usize::try_from(chunk_indices.value(i))?,
                    text: texts.value(i).to_string(),
                },
                vector,
                norm: norms.value(i),
            });
        }
    }
    Ok(records)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("{name} column missing"))
}
