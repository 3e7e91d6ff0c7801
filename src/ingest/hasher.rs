use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use memmap2::MmapOptions;
use sha2::{Digest, Sha256};

use crate::database::repo::MediaFile;
use crate::error::ScanError;

const MMAP_THRESHOLD: u64 = 500 * 1024 * 1024; // 500 MB

/// Whether a file needs hashing this sweep. Stored checksums are trusted
/// forever unless `rehash_always` is set or someone cleared the column.
pub fn needs_checksum(existing: Option<&MediaFile>, rehash_always: bool) -> bool {
    match existing {
        None => true,
        Some(_) if rehash_always => true,
        Some(file) => !file.has_checksum(),
    }
}

/// Hex-encoded SHA-256 of the file contents. I/O failures come back as
/// `ScanError::TransientFile` for `path`.
pub fn calculate_hash(path: &Path) -> Result<String, ScanError> {
    digest_file(path).map_err(|e| ScanError::file(path, e))
}

fn digest_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut hasher = Sha256::new();

    if file.metadata()?.len() > MMAP_THRESHOLD {
        // Truncation of the file while mapped would SIGBUS; sweeps assume
        // nobody rewrites large media files underneath them.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        hasher.update(&mmap[..]);
    } else {
        let mut reader = BufReader::with_capacity(8192, file);
        io::copy(&mut reader, &mut hasher)?;
    }

    Ok(hex::encode(hasher.finalize()))
}
