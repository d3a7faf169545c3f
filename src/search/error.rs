use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to callers of the query path
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Index not found at {}. Build the index first.", path.display())]
    StoreMissing { path: PathBuf },

    #[error("Search index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StoreMissing,
    Internal,
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::StoreMissing { .. } => ErrorKind::StoreMissing,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<anyhow::Error> for SearchError {
    fn from(err: anyhow::Error) -> Self {
        SearchError::Internal(format!("{err:#}"))
    }
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;
