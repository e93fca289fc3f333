//! Error types for the witness index.

use std::io;
use std::path::{Path, PathBuf};

/// Errors surfaced by index, search and TF-IDF operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Empty search input, or a query that reduces to no searchable terms.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Query syntax could not be parsed.
    #[error("failed to parse query `{query}` at position {position}: {reason}")]
    QueryParse {
        query: String,
        position: usize,
        reason: String,
    },

    /// Any I/O or decode failure while opening, reading or writing the index.
    #[error("index unavailable at {}: {source}", path.display())]
    IndexUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl IndexError {
    pub(crate) fn unavailable(path: &Path, source: io::Error) -> Self {
        IndexError::IndexUnavailable {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Wraps a decode/encode failure of an index file as an `InvalidData` I/O error.
    pub(crate) fn corrupt<E>(path: &Path, err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::unavailable(path, io::Error::new(io::ErrorKind::InvalidData, err))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, IndexError::IndexUnavailable { .. })
    }
}

/// Result type alias using [`IndexError`].
pub type Result<T> = std::result::Result<T, IndexError>;
