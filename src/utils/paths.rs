use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot resolve {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0:?} resolves outside the media root")]
    OutsideRoot(String),
}

/// Joins a stored relative path with the root and refuses anything that
/// ends up outside it once symlinks and `..` are resolved.
pub fn resolve_under_root(root: &Path, relative: &str) -> Result<PathBuf, ResolveError> {
    let relative_path = Path::new(relative);
    if relative_path.is_absolute() {
        return Err(ResolveError::OutsideRoot(relative.to_string()));
    }

    let canonical_root = root.canonicalize().map_err(|source| ResolveError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let joined = canonical_root.join(relative_path);
    let resolved = joined.canonicalize().map_err(|source| ResolveError::Io {
        path: joined.clone(),
        source,
    })?;

    if !resolved.starts_with(&canonical_root) {
        return Err(ResolveError::OutsideRoot(relative.to_string()));
    }
    Ok(resolved)
}
