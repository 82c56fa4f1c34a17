//! docqa-vector
//!
//! Persistent vector index on LanceDB. See [`VectorIndex`].
pub mod index;
pub mod schema;
pub mod table;
pub mod writer;

pub use index::{retired_path, VectorIndex};
pub use writer::{embed_chunks, record_id};
