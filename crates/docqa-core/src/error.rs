use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No usable documents found under {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("No index found at {}", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Index holds no records")]
    EmptyIndex,

    #[error("Vector dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{what} failed: {message}")]
    Collaborator { what: &'static str, message: String },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an error raised by an external collaborator (embedder, generator, extractor).
    pub fn collaborator(what: &'static str, err: &anyhow::Error) -> Self {
        Self::Collaborator { what, message: format!("{err:#}") }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
