use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const CHUNKS_TABLE: &str = "chunks";
pub const META_TABLE: &str = "meta";

pub fn build_chunks_schema(dim: i32) -> Arc<Schema> {
    let item = Arc::new(Field::new("item", DataType::Float32, true));
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("source_id", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("norm", DataType::Float32, false),
        Field::new("vector", DataType::FixedSizeList(item, dim), true),
    ]))
}

// Key/value pairs describing a finished build; written after the chunks table.
pub fn build_meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
    ]))
}
