use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::ScanError;
use crate::media::kind::MediaKind;

/// Keyword-bearing fields consulted first for images, in priority order.
pub const IMAGE_KEYWORD_FIELDS: &[&str] = &[
    "XPKeywords",
    "Keywords",
    "Subject",
    "XPSubject",
    "LastKeywordXMP",
    "HierarchicalSubject",
    "SupplementalCategories",
    "Category",
];

/// Container-level fields consulted first for videos, in priority order.
pub const VIDEO_KEYWORD_FIELDS: &[&str] = &[
    "Keywords",
    "com.apple.quicktime.keywords",
    "keyw",
    "Category",
    "Genre",
    "Comment",
    "Title",
];

const FIELD_NAME_PATTERN: &str =
    r"(?i)(keys.*keywords|keywords?|subject|categor(y|ies)|\btags?|comment|title)";

fn field_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(FIELD_NAME_PATTERN).expect("field name pattern is valid"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(String),
    List(Vec<String>),
}

/// Metadata fields of one file in the order the reader produced them. Names
/// are kept as reported; lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct MetadataFields {
    fields: Vec<(String, MetadataValue)>,
}

impl MetadataFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: MetadataValue) {
        self.fields.push((name.into(), value));
    }

    pub fn push_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.push(name, MetadataValue::Text(value.into()));
    }

    pub fn append(&mut self, other: MetadataFields) {
        self.fields.extend(other.fields);
    }

    pub fn values_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MetadataValue> {
        self.fields
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Source of embedded metadata. Implementations may fail freely; the
/// extractor turns every failure into "no tags".
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path, kind: MediaKind) -> Result<MetadataFields, ScanError>;
}

/// Candidate tag strings for one file, deduplicated case-insensitively in
/// encounter order. Never fails.
pub fn extract(reader: &dyn MetadataReader, path: &Path, kind: MediaKind) -> Vec<String> {
    match reader.read(path, kind) {
        Ok(fields) if fields.is_empty() => Vec::new(),
        Ok(fields) => collect_keywords(&fields, kind),
        Err(e) => {
            debug!("No keywords for {:?}: {}", path, e);
            Vec::new()
        }
    }
}

pub fn priority_fields(kind: MediaKind) -> &'static [&'static str] {
    match kind {
        MediaKind::Image => IMAGE_KEYWORD_FIELDS,
        MediaKind::Video => VIDEO_KEYWORD_FIELDS,
    }
}

pub fn collect_keywords(fields: &MetadataFields, kind: MediaKind) -> Vec<String> {
    let explicit = priority_fields(kind);
    let mut pool = KeywordPool::default();

    for name in explicit {
        for value in fields.values_named(name) {
            pool.add(value);
        }
    }

    let pattern = field_name_pattern();
    for (name, value) in fields.iter() {
        if explicit.iter().any(|e| e.eq_ignore_ascii_case(name)) {
            continue;
        }
        if pattern.is_match(name) {
            pool.add(value);
        }
    }

    pool.into_vec()
}

/// Trim, lower-case, drop blanks and dedupe, keeping first-seen order.
pub fn normalize_tags<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

#[derive(Default)]
struct KeywordPool {
    values: Vec<String>,
    seen: HashSet<String>,
}

impl KeywordPool {
    fn add(&mut self, value: &MetadataValue) {
        match value {
            MetadataValue::List(items) => {
                for item in items {
                    self.push(item);
                }
            }
            MetadataValue::Text(text) => {
                for fragment in text.split([';', ',', '|']) {
                    self.push(fragment);
                }
            }
        }
    }

    fn push(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        if self.seen.insert(fragment.to_lowercase()) {
            self.values.push(fragment.to_string());
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.values
    }
}
