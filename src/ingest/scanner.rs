use std::path::{Component, Path, PathBuf};

use crossbeam::channel::Sender;
use tracing::warn;
use walkdir::WalkDir;

use crate::media::kind::{extension_of, ExtensionFilter};

/// A file that passed the extension filter, ready for indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub path: PathBuf,
    /// `/`-separated path relative to the sweep root.
    pub relative: String,
    pub filename: String,
    pub extension: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WalkOutcome {
    pub candidates: usize,
    pub errors: usize,
    /// False when the receiver hung up before the walk finished.
    pub finished: bool,
}

impl WalkOutcome {
    /// Only a finished, error-free walk may drive pruning.
    pub fn is_complete(&self) -> bool {
        self.finished && self.errors == 0
    }
}

pub fn scan_directory(root: &Path, filter: &ExtensionFilter, tx: Sender<Candidate>) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();
    let walker = WalkDir::new(root).follow_links(false).into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Walk error under {:?}: {}", root, e);
                outcome.errors += 1;
                continue;
            }
        };
        // Symlinks are not followed, so they are neither files nor dirs here.
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(candidate) = candidate_for(root, entry.path(), filter) else {
            continue;
        };
        outcome.candidates += 1;
        if tx.send(candidate).is_err() {
            return outcome;
        }
    }

    outcome.finished = true;
    outcome
}

/// Builds a candidate for `path` if its extension is allowed and the path
/// can be stored as UTF-8 relative to `root`.
pub fn candidate_for(root: &Path, path: &Path, filter: &ExtensionFilter) -> Option<Candidate> {
    let extension = extension_of(path)?;
    if !filter.allows(&extension) {
        return None;
    }

    let relative = match relative_path(root, path) {
        Some(relative) => relative,
        None => {
            warn!("Skipping {:?}: path is not valid UTF-8 under the root", path);
            return None;
        }
    };
    let filename = path.file_name()?.to_str()?.to_string();

    Some(Candidate {
        path: path.to_path_buf(),
        relative,
        filename,
        extension,
    })
}

pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in stripped.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
