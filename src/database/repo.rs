use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use tracing::{debug, info};

use crate::database::schema::{MEDIA_FILE_COLUMNS, PRAGMAS, SCHEMA};
use crate::error::{CatalogError, CatalogResult};
use crate::media::kind::MediaKind;
use crate::media::metadata::normalize_tags;

/// One indexed file, keyed by its path relative to the sweep root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaFile {
    pub id: i64,
    pub path: String,
    pub filename: String,
    pub extension: String,
    pub kind: MediaKind,
    pub size: u64,
    pub checksum: Option<String>,
    pub raw_keywords: Option<String>,
    pub mtime: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaFile {
    pub fn has_checksum(&self) -> bool {
        self.checksum.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// Attributes written by `Catalog::upsert`. A `None` checksum leaves any
/// stored checksum in place.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttrs {
    pub filename: String,
    pub extension: String,
    pub kind: MediaKind,
    pub size: u64,
    pub checksum: Option<String>,
    pub raw_keywords: Option<String>,
    pub mtime: Option<i64>,
}

/// SQLite-backed catalog of media files and their tags.
///
/// The connection sits behind a mutex so a single catalog can be shared by
/// the sweep's worker pool. Every public operation is atomic on its own.
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    pub fn open(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let catalog = Self::init(conn)?;
        info!("Opened catalog at {:?}", path);
        Ok(catalog)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> CatalogResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> CatalogResult<Self> {
        conn.execute_batch(PRAGMAS)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> CatalogResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CatalogError::Poisoned)
    }

    /// Find-or-create the row for `path` and apply `attrs` in one statement.
    pub fn upsert(&self, path: &str, attrs: &FileAttrs) -> CatalogResult<MediaFile> {
        let size = i64::try_from(attrs.size)
            .map_err(|_| CatalogError::Corrupt(format!("size {} does not fit", attrs.size)))?;
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO media_files
                (path, filename, extension, kind, size, checksum, raw_keywords, mtime, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(path) DO UPDATE SET
                filename = excluded.filename,
                extension = excluded.extension,
                kind = excluded.kind,
                size = excluded.size,
                checksum = COALESCE(excluded.checksum, media_files.checksum),
                raw_keywords = excluded.raw_keywords,
                mtime = excluded.mtime,
                updated_at = excluded.updated_at
             RETURNING {}",
            MEDIA_FILE_COLUMNS
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let file = stmt.query_row(
            params![
                path,
                attrs.filename,
                attrs.extension,
                attrs.kind.as_str(),
                size,
                attrs.checksum,
                attrs.raw_keywords,
                attrs.mtime,
                now
            ],
            media_file_from_row,
        )?;
        Ok(file)
    }

    /// Replaces every tag link of a file. An empty list is a no-op and keeps
    /// whatever links the file already had.
    pub fn replace_tags(&self, media_file_id: i64, tag_names: &[String]) -> CatalogResult<()> {
        let names = normalize_tags(tag_names);
        if names.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            tx.execute(
                "DELETE FROM file_tags WHERE media_file_id = ?1",
                params![media_file_id],
            )?;

            let mut stmt_tag =
                tx.prepare_cached("INSERT OR IGNORE INTO tags (name, created_at) VALUES (?1, ?2)")?;
            let mut stmt_get_tag_id = tx.prepare_cached("SELECT id FROM tags WHERE name = ?1")?;
            let mut stmt_file_tag = tx.prepare_cached(
                "INSERT OR IGNORE INTO file_tags (media_file_id, tag_id) VALUES (?1, ?2)",
            )?;

            for name in &names {
                stmt_tag.execute(params![name, now])?;
                let tag_id: i64 = stmt_get_tag_id.query_row(params![name], |row| row.get(0))?;
                stmt_file_tag.execute(params![media_file_id, tag_id])?;
            }
        }
        tx.commit()?;

        debug!("Linked {} tags to media file {}", names.len(), media_file_id);
        Ok(())
    }

    /// Deletes rows under the relative folder `scope` (`""` for the whole
    /// root) whose path is not in `observed`. Links go with them; tags stay.
    ///
    /// Only call this after a complete walk.
    pub fn prune(&self, scope: &str, observed: &HashSet<String>) -> CatalogResult<usize> {
        let scope = scope.trim_matches('/');
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = {
            let mut select = tx.prepare(
                "SELECT id, path FROM media_files
                 WHERE ?1 = '' OR substr(path, 1, length(?1) + 1) = ?1 || '/'",
            )?;
            let rows = select
                .query_map(params![scope], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut delete = tx.prepare("DELETE FROM media_files WHERE id = ?1")?;
            let mut removed = 0;
            for (id, path) in rows {
                if observed.contains(&path) {
                    continue;
                }
                removed += delete.execute(params![id])?;
                debug!("Pruned {}", path);
            }
            removed
        };
        tx.commit()?;
        Ok(removed)
    }

    /// Clears the stored checksum so the next sweep recomputes it.
    pub fn clear_checksum(&self, path: &str) -> CatalogResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE media_files SET checksum = NULL WHERE path = ?1",
            params![path],
        )?;
        Ok(changed > 0)
    }

    /// Removes tags no file links to any more.
    pub fn prune_orphan_tags(&self) -> CatalogResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM tags WHERE id NOT IN (SELECT DISTINCT tag_id FROM file_tags)",
            [],
        )?;
        Ok(removed)
    }
}

pub(crate) fn media_file_from_row(row: &Row<'_>) -> rusqlite::Result<MediaFile> {
    let kind: String = row.get(4)?;
    let kind = kind
        .parse::<MediaKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?;
    let size: i64 = row.get(5)?;

    Ok(MediaFile {
        id: row.get(0)?,
        path: row.get(1)?,
        filename: row.get(2)?,
        extension: row.get(3)?,
        kind,
        size: size.max(0) as u64,
        checksum: row.get(6)?,
        raw_keywords: row.get(7)?,
        mtime: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
