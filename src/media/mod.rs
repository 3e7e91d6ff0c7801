pub mod exif;
pub mod ffprobe;
pub mod iptc;
pub mod kind;
pub mod metadata;
pub mod xmp;

use std::path::{Path, PathBuf};

use crate::error::ScanError;
use crate::media::kind::MediaKind;
use crate::media::metadata::{MetadataFields, MetadataReader};

/// Default reader: EXIF, IPTC and XMP for images, ffprobe container tags
/// plus XMP for videos. Fails only when no source produced anything.
pub struct NativeMetadataReader {
    ffprobe: PathBuf,
}

impl NativeMetadataReader {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

impl Default for NativeMetadataReader {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MetadataReader for NativeMetadataReader {
    fn read(&self, path: &Path, kind: MediaKind) -> Result<MetadataFields, ScanError> {
        let sources = match kind {
            MediaKind::Image => vec![
                exif::read_exif_fields(path),
                iptc::read_iptc_fields(path),
                xmp::read_xmp_fields(path),
            ],
            MediaKind::Video => vec![
                ffprobe::read_container_fields(&self.ffprobe, path),
                xmp::read_xmp_fields(path),
            ],
        };

        let mut merged: Option<MetadataFields> = None;
        let mut first_error = None;
        for source in sources {
            match source {
                Ok(fields) => merged.get_or_insert_with(MetadataFields::new).append(fields),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match (merged, first_error) {
            (Some(fields), _) => Ok(fields),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(MetadataFields::new()),
        }
    }
}
