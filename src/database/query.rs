use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde::Serialize;

use crate::database::repo::{media_file_from_row, Catalog, MediaFile};
use crate::database::schema::MEDIA_FILE_COLUMNS;
use crate::error::CatalogResult;
use crate::media::kind::MediaKind;
use crate::media::metadata::normalize_tags;

pub const DEFAULT_PER_PAGE: u32 = 500;
pub const MAX_PER_PAGE: u32 = 2000;

/// Filters for `Catalog::list`. Empty fields do not filter; values inside
/// one field are alternatives.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub kinds: Vec<MediaKind>,
    pub extensions: Vec<String>,
    /// Relative folder prefixes, e.g. `trips/2024`.
    pub folders: Vec<String>,
    pub tags: Vec<String>,
    /// Case-insensitive substring of filename or path.
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

/// A media file together with its tag names, as handed to readers.
#[derive(Debug, Clone, Serialize)]
pub struct MediaEntry {
    #[serde(flatten)]
    pub file: MediaFile,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCount {
    pub name: String,
    pub files: u64,
}

impl Catalog {
    pub fn get(&self, id: i64) -> CatalogResult<Option<MediaFile>> {
        self.find_one("id = ?1", &id)
    }

    pub fn find_by_path(&self, path: &str) -> CatalogResult<Option<MediaFile>> {
        self.find_one("path = ?1", &path)
    }

    pub fn get_by_checksum(&self, checksum: &str) -> CatalogResult<Option<MediaFile>> {
        self.find_one("checksum = ?1", &checksum.to_ascii_lowercase())
    }

    pub fn get_by_filename(&self, filename: &str) -> CatalogResult<Option<MediaFile>> {
        self.find_one("filename = ?1", &filename)
    }

    fn find_one(&self, condition: &str, value: &dyn ToSql) -> CatalogResult<Option<MediaFile>> {
        let sql = format!(
            "SELECT {} FROM media_files WHERE {} ORDER BY id LIMIT 1",
            MEDIA_FILE_COLUMNS, condition
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        Ok(stmt.query_row([value], media_file_from_row).optional()?)
    }

    pub fn tags_for(&self, media_file_id: i64) -> CatalogResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT t.name FROM tags t
             JOIN file_tags ft ON ft.tag_id = t.id
             WHERE ft.media_file_id = ?1
             ORDER BY t.name",
        )?;
        let names = stmt
            .query_map(params![media_file_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn count(&self) -> CatalogResult<u64> {
        let conn = self.lock()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM media_files", [], |row| row.get(0))?;
        Ok(total.max(0) as u64)
    }

    pub fn tag_counts(&self) -> CatalogResult<Vec<TagCount>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT t.name, COUNT(ft.media_file_id) FROM tags t
             LEFT JOIN file_tags ft ON ft.tag_id = t.id
             GROUP BY t.id
             ORDER BY t.name",
        )?;
        let counts = stmt
            .query_map([], |row| {
                let files: i64 = row.get(1)?;
                Ok(TagCount {
                    name: row.get(0)?,
                    files: files.max(0) as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Newest rows first.
    pub fn list(&self, filter: &ListFilter, page: PageRequest) -> CatalogResult<Page<MediaEntry>> {
        let (clause, values) = build_where(filter);

        let total: i64 = {
            let conn = self.lock()?;
            let sql = format!("SELECT COUNT(*) FROM media_files {}", clause);
            conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?
        };
        let total = total.max(0) as u64;

        let files = {
            let conn = self.lock()?;
            let sql = format!(
                "SELECT {} FROM media_files {} ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}",
                MEDIA_FILE_COLUMNS,
                clause,
                page.per_page,
                page.offset()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), media_file_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut items = Vec::with_capacity(files.len());
        for file in files {
            let tags = self.tags_for(file.id)?;
            items.push(MediaEntry { file, tags });
        }

        Ok(Page {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
            total_pages: total.div_ceil(u64::from(page.per_page)),
        })
    }
}

fn build_where(filter: &ListFilter) -> (String, Vec<String>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if !filter.kinds.is_empty() {
        conditions.push(format!("kind IN ({})", placeholders(filter.kinds.len())));
        values.extend(filter.kinds.iter().map(|k| k.as_str().to_string()));
    }

    let extensions: Vec<String> = filter
        .extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    if !extensions.is_empty() {
        conditions.push(format!("extension IN ({})", placeholders(extensions.len())));
        values.extend(extensions);
    }

    let folders: Vec<String> = filter
        .folders
        .iter()
        .map(|f| f.trim().trim_matches('/').to_string())
        .filter(|f| !f.is_empty())
        .collect();
    if !folders.is_empty() {
        let ors: Vec<&str> = folders.iter().map(|_| "path LIKE ? ESCAPE '\\'").collect();
        conditions.push(format!("({})", ors.join(" OR ")));
        values.extend(folders.iter().map(|f| format!("{}/%", escape_like(f))));
    }

    let tags = normalize_tags(&filter.tags);
    if !tags.is_empty() {
        conditions.push(format!(
            "id IN (SELECT ft.media_file_id FROM file_tags ft
                    JOIN tags t ON t.id = ft.tag_id
                    WHERE t.name IN ({}))",
            placeholders(tags.len())
        ));
        values.extend(tags);
    }

    if let Some(query) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        conditions.push(
            "(LOWER(filename) LIKE ? ESCAPE '\\' OR LOWER(path) LIKE ? ESCAPE '\\')".to_string(),
        );
        values.push(pattern.clone());
        values.push(pattern);
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), values)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
