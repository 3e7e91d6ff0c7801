use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::ScanError;
use crate::media::metadata::{MetadataFields, MetadataValue};

const APP13: u8 = 0xED;
const PHOTOSHOP_SIGNATURE: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_SIGNATURE: &[u8] = b"8BIM";
const IPTC_RESOURCE: u16 = 0x0404;
const TAG_MARKER: u8 = 0x1C;
const APPLICATION_RECORD: u8 = 2;

// Application record datasets that carry keyword-like text, with the names
// exiftool gives them.
const DATASETS: &[(u8, &str)] = &[
    (15, "Category"),
    (20, "SupplementalCategories"),
    (25, "Keywords"),
];

/// Reads IPTC IIM keywords from the Photoshop APP13 segment of a JPEG.
pub fn read_iptc_fields(path: &Path) -> Result<MetadataFields, ScanError> {
    let file = File::open(path).map_err(|e| ScanError::file(path, e))?;
    let blocks = photoshop_blocks(BufReader::new(file)).map_err(|e| ScanError::file(path, e))?;

    let mut grouped: Vec<(&'static str, Vec<String>)> = Vec::new();
    for block in &blocks {
        for resource in iptc_resources(block) {
            for (dataset, value) in application_records(resource) {
                let Some(name) = dataset_name(dataset) else {
                    continue;
                };
                match grouped.iter_mut().find(|(n, _)| *n == name) {
                    Some((_, values)) => values.push(decode_text(value)),
                    None => grouped.push((name, vec![decode_text(value)])),
                }
            }
        }
    }

    if grouped.is_empty() {
        return Err(ScanError::MetadataRead {
            path: path.to_path_buf(),
            reason: "no IPTC keywords".into(),
        });
    }

    let mut fields = MetadataFields::new();
    for (name, mut values) in grouped {
        let value = if name == "Category" && values.len() == 1 {
            MetadataValue::Text(values.remove(0))
        } else {
            MetadataValue::List(values)
        };
        fields.push(name, value);
    }
    Ok(fields)
}

fn dataset_name(dataset: u8) -> Option<&'static str> {
    DATASETS.iter().find(|(d, _)| *d == dataset).map(|(_, name)| *name)
}

/// Payloads of every Photoshop APP13 segment before the image data. Files
/// that are not JPEGs yield nothing.
fn photoshop_blocks(mut reader: impl Read) -> io::Result<Vec<Vec<u8>>> {
    let mut blocks = Vec::new();
    let mut soi = [0u8; 2];
    if !read_or_eof(&mut reader, &mut soi)? || soi != [0xFF, 0xD8] {
        return Ok(blocks);
    }

    loop {
        let mut marker = [0u8; 2];
        if !read_or_eof(&mut reader, &mut marker)? || marker[0] != 0xFF {
            break;
        }
        // Fill bytes before a marker.
        while marker[1] == 0xFF {
            if !read_or_eof(&mut reader, &mut marker[1..])? {
                return Ok(blocks);
            }
        }
        match marker[1] {
            0xD9 | 0xDA => break,
            0x01 | 0xD0..=0xD7 => continue,
            _ => {}
        }

        let mut len = [0u8; 2];
        if !read_or_eof(&mut reader, &mut len)? {
            break;
        }
        let len = u16::from_be_bytes(len).saturating_sub(2) as u64;

        if marker[1] == APP13 {
            let mut payload = Vec::with_capacity(len as usize);
            reader.by_ref().take(len).read_to_end(&mut payload)?;
            if let Some(body) = payload.strip_prefix(PHOTOSHOP_SIGNATURE) {
                blocks.push(body.to_vec());
            }
        } else {
            io::copy(&mut reader.by_ref().take(len), &mut io::sink())?;
        }
    }
    Ok(blocks)
}

fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Image resource blocks with id 0x0404. Names are Pascal strings padded to
/// an even length; data is padded likewise.
fn iptc_resources(block: &[u8]) -> Vec<&[u8]> {
    let mut found = Vec::new();
    let mut rest = block;

    while rest.len() >= 12 && rest.starts_with(RESOURCE_SIGNATURE) {
        let id = u16::from_be_bytes([rest[4], rest[5]]);
        let name_len = 1 + rest[6] as usize;
        let mut pos = 6 + name_len + name_len % 2;
        if rest.len() < pos + 4 {
            break;
        }
        let size = u32::from_be_bytes([rest[pos], rest[pos + 1], rest[pos + 2], rest[pos + 3]]) as usize;
        pos += 4;
        let Some(data) = rest.get(pos..pos + size) else {
            break;
        };
        if id == IPTC_RESOURCE {
            found.push(data);
        }
        rest = rest.get(pos + size + size % 2..).unwrap_or_default();
    }
    found
}

/// `(dataset, value)` pairs of record 2. Extended-length datasets end the
/// scan; text datasets never use them.
fn application_records(data: &[u8]) -> Vec<(u8, &[u8])> {
    let mut records = Vec::new();
    let mut pos = 0;

    while pos + 5 <= data.len() && data[pos] == TAG_MARKER {
        let record = data[pos + 1];
        let dataset = data[pos + 2];
        let len = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        if len & 0x8000 != 0 {
            break;
        }
        pos += 5;
        let Some(value) = data.get(pos..pos + len) else {
            break;
        };
        if record == APPLICATION_RECORD {
            records.push((dataset, value));
        }
        pos += len;
    }
    records
}

/// UTF-8 when it decodes, Latin-1 otherwise.
fn decode_text(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    };
    text.trim_end_matches('\0').trim().to_string()
}

/// A minimal JPEG whose only metadata is an APP13 segment holding the given
/// application record datasets.
#[cfg(test)]
pub(crate) fn jpeg_with_iptc(datasets: &[(u8, &str)]) -> Vec<u8> {
    let mut iim = Vec::new();
    // Coded character set: UTF-8.
    iim.extend_from_slice(&[TAG_MARKER, 1, 90, 0, 3, 0x1B, b'%', b'G']);
    for (dataset, value) in datasets {
        iim.extend_from_slice(&[TAG_MARKER, APPLICATION_RECORD, *dataset]);
        iim.extend_from_slice(&(value.len() as u16).to_be_bytes());
        iim.extend_from_slice(value.as_bytes());
    }

    let mut resources = Vec::new();
    // An unrelated resource with a named, odd-length payload comes first.
    resources.extend_from_slice(RESOURCE_SIGNATURE);
    resources.extend_from_slice(&0x040Cu16.to_be_bytes());
    resources.extend_from_slice(&[3, b'a', b'b', b'c']);
    resources.extend_from_slice(&3u32.to_be_bytes());
    resources.extend_from_slice(&[1, 2, 3, 0]);
    resources.extend_from_slice(RESOURCE_SIGNATURE);
    resources.extend_from_slice(&IPTC_RESOURCE.to_be_bytes());
    resources.extend_from_slice(&[0, 0]);
    resources.extend_from_slice(&(iim.len() as u32).to_be_bytes());
    resources.extend_from_slice(&iim);
    if iim.len() % 2 == 1 {
        resources.push(0);
    }

    let mut payload = PHOTOSHOP_SIGNATURE.to_vec();
    payload.extend_from_slice(&resources);

    let mut jpeg = vec![0xFF, 0xD8];
    // An APP0 segment to skip over.
    jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x07, b'J', b'F', b'I', b'F', 0]);
    jpeg.extend_from_slice(&[0xFF, APP13]);
    jpeg.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    jpeg.extend_from_slice(&payload);
    jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0xFF, 0xD9]);
    jpeg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::kind::MediaKind;
    use crate::media::metadata::collect_keywords;
    use std::fs;

    #[test]
    fn test_reads_keywords_and_supplemental_categories() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("iptc.jpg");
        fs::write(
            &path,
            jpeg_with_iptc(&[
                (5, "Title that is not a keyword"),
                (25, "Dog"),
                (25, "Café"),
                (20, "Travel"),
            ]),
        )?;

        let fields = read_iptc_fields(&path)?;
        let keywords: Vec<_> = fields.values_named("Keywords").collect();
        assert_eq!(
            keywords,
            vec![&MetadataValue::List(vec!["Dog".into(), "Café".into()])]
        );
        assert_eq!(fields.values_named("ObjectName").count(), 0);
        assert_eq!(
            collect_keywords(&fields, MediaKind::Image),
            vec!["Dog", "Café", "Travel"]
        );
        Ok(())
    }

    #[test]
    fn test_jpeg_without_keywords_is_a_metadata_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("plain.jpg");
        fs::write(&path, jpeg_with_iptc(&[(5, "Only a title")]))?;
        assert!(matches!(
            read_iptc_fields(&path),
            Err(ScanError::MetadataRead { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_non_jpeg_and_truncated_input_yield_no_blocks() -> anyhow::Result<()> {
        assert!(photoshop_blocks(&b"\x89PNG\r\n\x1a\n"[..])?.is_empty());

        let jpeg = jpeg_with_iptc(&[(25, "Dog")]);
        let truncated = &jpeg[..jpeg.len() / 2];
        assert!(photoshop_blocks(truncated)?.len() <= 1);
        Ok(())
    }

    #[test]
    fn test_latin1_values_are_decoded() {
        assert_eq!(decode_text(b"caf\xe9\0"), "café");
    }
}
