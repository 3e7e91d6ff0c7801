use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{Context, Field, Tag, Value};

use crate::error::ScanError;
use crate::media::metadata::{MetadataFields, MetadataValue};

// Windows Explorer fields live in IFD0 and are not named by the exif crate.
const XP_TITLE: Tag = Tag(Context::Tiff, 0x9c9b);
const XP_COMMENT: Tag = Tag(Context::Tiff, 0x9c9c);
const XP_AUTHOR: Tag = Tag(Context::Tiff, 0x9c9d);
const XP_KEYWORDS: Tag = Tag(Context::Tiff, 0x9c9e);
const XP_SUBJECT: Tag = Tag(Context::Tiff, 0x9c9f);

/// Reads every EXIF field of an image container into `MetadataFields`,
/// naming fields the way exiftool does.
pub fn read_exif_fields(path: &Path) -> Result<MetadataFields, ScanError> {
    let file = File::open(path).map_err(|e| ScanError::file(path, e))?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| ScanError::MetadataRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut fields = MetadataFields::new();
    for field in exif.fields() {
        let (name, value) = convert_field(field);
        fields.push(name, value);
    }
    Ok(fields)
}

const XP_FIELDS: &[(Tag, &str)] = &[
    (XP_TITLE, "XPTitle"),
    (XP_COMMENT, "XPComment"),
    (XP_AUTHOR, "XPAuthor"),
    (XP_KEYWORDS, "XPKeywords"),
    (XP_SUBJECT, "XPSubject"),
];

fn xp_name(tag: Tag) -> Option<&'static str> {
    XP_FIELDS.iter().find(|(t, _)| *t == tag).map(|(_, name)| *name)
}

fn field_name(tag: Tag) -> String {
    xp_name(tag).map_or_else(|| tag.to_string(), str::to_string)
}

fn convert_field(field: &Field) -> (String, MetadataValue) {
    let name = field_name(field.tag);

    let value = match &field.value {
        Value::Byte(bytes) if xp_name(field.tag).is_some() => {
            MetadataValue::Text(decode_ucs2(bytes))
        }
        Value::Undefined(bytes, _) if field.tag == Tag::UserComment => {
            MetadataValue::Text(decode_user_comment(bytes))
        }
        Value::Ascii(parts) => {
            let mut strings: Vec<String> = parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
                .collect();
            if strings.len() == 1 {
                MetadataValue::Text(strings.remove(0))
            } else {
                MetadataValue::List(strings)
            }
        }
        _ => MetadataValue::Text(field.display_value().to_string()),
    };

    (name, value)
}

/// XP* fields are UCS-2 little endian, NUL terminated.
fn decode_ucs2(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// UserComment carries an 8 byte character code prefix.
fn decode_user_comment(bytes: &[u8]) -> String {
    if bytes.len() < 8 {
        return String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string();
    }
    let (code, body) = bytes.split_at(8);
    let text = if code.starts_with(b"UNICODE") {
        decode_ucs2(body)
    } else {
        String::from_utf8_lossy(body).to_string()
    };
    text.trim_end_matches(['\0', ' ']).to_string()
}
