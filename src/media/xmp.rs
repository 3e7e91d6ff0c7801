use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ScanError;
use crate::media::metadata::{MetadataFields, MetadataValue};

// XMP packets sit near the start of JPEG/WebP/HEIF files; the limit bounds
// memory on large TIFFs.
const XMP_SCAN_LIMIT: u64 = 16 * 1024 * 1024;

const PACKET_START: &[u8] = b"<x:xmpmeta";
const PACKET_END: &[u8] = b"</x:xmpmeta>";

const IGNORED_PREFIXES: &[&str] = &["xmlns", "rdf", "x", "xml"];

struct Patterns {
    array: Regex,
    item: Regex,
    attribute: Regex,
    simple: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        array: Regex::new(
            r"(?s)<([A-Za-z][\w.-]*):([A-Za-z][\w.-]*)(?:\s[^>]*)?>\s*<rdf:(?:Bag|Seq|Alt)\b[^>]*>(.*?)</rdf:(?:Bag|Seq|Alt)>",
        )
        .expect("xmp array pattern is valid"),
        item: Regex::new(r"(?s)<rdf:li\b[^>]*>(.*?)</rdf:li>").expect("xmp item pattern is valid"),
        attribute: Regex::new(r#"([A-Za-z][\w.-]*):([A-Za-z][\w.-]*)="([^"]*)""#)
            .expect("xmp attribute pattern is valid"),
        simple: Regex::new(
            r"<([A-Za-z][\w.-]*):([A-Za-z][\w.-]*)>([^<]*)</([A-Za-z][\w.-]*):([A-Za-z][\w.-]*)>",
        )
        .expect("xmp element pattern is valid"),
    })
}

/// Reads the embedded XMP packet of a file, if any.
pub fn read_xmp_fields(path: &Path) -> Result<MetadataFields, ScanError> {
    let file = File::open(path).map_err(|e| ScanError::file(path, e))?;
    let mut buffer = Vec::new();
    file.take(XMP_SCAN_LIMIT)
        .read_to_end(&mut buffer)
        .map_err(|e| ScanError::file(path, e))?;

    match find_packet(&buffer) {
        Some(packet) => Ok(parse_packet(&String::from_utf8_lossy(packet))),
        None => Err(ScanError::MetadataRead {
            path: path.to_path_buf(),
            reason: "no XMP packet".into(),
        }),
    }
}

fn find_packet(bytes: &[u8]) -> Option<&[u8]> {
    let start = find(bytes, PACKET_START)?;
    let end = find(&bytes[start..], PACKET_END)? + start + PACKET_END.len();
    Some(&bytes[start..end])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Flattens an XMP packet into fields named by their local property name
/// (`dc:subject` becomes `Subject`). Arrays become list values.
pub fn parse_packet(packet: &str) -> MetadataFields {
    let p = patterns();
    let mut fields = MetadataFields::new();

    for caps in p.array.captures_iter(packet) {
        if is_ignored(&caps[1]) {
            continue;
        }
        let items: Vec<String> = p
            .item
            .captures_iter(&caps[3])
            .map(|item| unescape(item[1].trim()))
            .collect();
        fields.push(local_name(&caps[2]), MetadataValue::List(items));
    }

    for caps in p.attribute.captures_iter(packet) {
        if is_ignored(&caps[1]) {
            continue;
        }
        fields.push_text(local_name(&caps[2]), unescape(&caps[3]));
    }

    for caps in p.simple.captures_iter(packet) {
        if is_ignored(&caps[1]) || caps[1] != caps[4] || caps[2] != caps[5] {
            continue;
        }
        let text = caps[3].trim();
        if !text.is_empty() {
            fields.push_text(local_name(&caps[2]), unescape(text));
        }
    }

    fields
}

fn is_ignored(prefix: &str) -> bool {
    IGNORED_PREFIXES.contains(&prefix)
}

fn local_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
