//! docqa-core
//!
//! Domain types, error taxonomy and collaborator traits shared by the docqa
//! crates, plus the chunker, folder ingestion and configuration loading.
pub mod chunker;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod extract;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
