use std::path::PathBuf;

use thiserror::Error;

/// Failures a sweep can run into. None of these escape `Sweep::run`; they are
/// logged and folded into the `SweepReport`.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("file error at {path:?}: {source}")]
    TransientFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata read failed for {path:?}: {reason}")]
    MetadataRead { path: PathBuf, reason: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] CatalogError),

    #[error("sweep failed: {0}")]
    Fatal(String),
}

impl ScanError {
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::TransientFile {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("catalog lock poisoned")]
    Poisoned,

    #[error("stored value is invalid: {0}")]
    Corrupt(String),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
