use crate::storage::models::{DateSource, MediaType};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::path::Path;

const PHOTO_EXTS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "bmp", "tif", "tiff", "gif", "webp",
];

const RAW_EXTS: &[&str] = &[
    "cr2", "cr3", "nef", "nrw", "arw", "raf", "rw2", "orf", "pef", "rwl", "x3f", "dng",
];

const VIDEO_EXTS: &[&str] = &[
    "mp4", "mov", "m4v", "avi", "wmv", "webm", "mkv", "3gp", "mts", "m2ts", "mpg",
    "mpeg", "vob", "ts", "flv",
];

// Sidecars, catalogs and archives that are never migration candidates.
const EXCLUDED_EXTS: &[&str] = &[
    "xmp", "aae", "db", "sqlite", "xml", "json", "exe", "msi", "zip", "rar", "7z",
];

// Motion half of a live photo pair.
const LIVE_MOTION_EXTS: &[&str] = &["mov", "mp4"];

/// Extension → media-type table. Built once per run; lookups are on the
/// lowercased extension without the dot.
#[derive(Debug, Clone)]
pub struct ClassificationTable {
    photo: HashSet<&'static str>,
    raw: HashSet<&'static str>,
    video: HashSet<&'static str>,
    excluded: HashSet<&'static str>,
}

impl Default for ClassificationTable {
    fn default() -> Self {
        Self {
            photo: PHOTO_EXTS.iter().copied().collect(),
            raw: RAW_EXTS.iter().copied().collect(),
            video: VIDEO_EXTS.iter().copied().collect(),
            excluded: EXCLUDED_EXTS.iter().copied().collect(),
        }
    }
}

impl ClassificationTable {
    /// Unknown extensions classify as `other`; that is not an error.
    pub fn classify(&self, ext: &str) -> MediaType {
        let e = ext.to_ascii_lowercase();
        if self.raw.contains(e.as_str()) {
            MediaType::Raw
        } else if self.video.contains(e.as_str()) {
            MediaType::Video
        } else if self.photo.contains(e.as_str()) {
            MediaType::Photo
        } else {
            MediaType::Other
        }
    }

    pub fn is_excluded(&self, ext: &str) -> bool {
        self.excluded.contains(ext.to_ascii_lowercase().as_str())
    }
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_live_motion_ext(ext: &str) -> bool {
    LIVE_MOTION_EXTS.contains(&ext.to_ascii_lowercase().as_str())
}

/// Generated thumbnails: `.thm` sidecars or `*_thumb` stems.
pub fn is_thumbnail(path: &Path) -> bool {
    if extension_of(path) == "thm" {
        return true;
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase().ends_with("_thumb"))
        .unwrap_or(false)
}

/// Resolve the date a file is organized under: a valid embedded capture
/// timestamp wins, otherwise the filesystem mtime. Returns the bucket date
/// as YYYY-MM-DD plus which source won.
pub fn choose_date(
    capture: Option<NaiveDateTime>,
    mtime: DateTime<Utc>,
) -> (String, DateSource) {
    match capture {
        Some(dt) => (dt.format("%Y-%m-%d").to_string(), DateSource::Exif),
        None => (mtime.format("%Y-%m-%d").to_string(), DateSource::Mtime),
    }
}

/// External capture-timestamp extractor. EXIF/container parsing is an
/// outside collaborator; the pipeline only consumes its result.
pub trait MetadataExtractor: Send + Sync {
    fn capture_datetime(&self, path: &Path) -> Option<NaiveDateTime>;
}

/// Extractor that never finds an embedded timestamp; every file falls back
/// to mtime dating.
pub struct NoMetadata;

impl MetadataExtractor for NoMetadata {
    fn capture_datetime(&self, _path: &Path) -> Option<NaiveDateTime> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn classify_known_and_unknown_extensions() {
        let table = ClassificationTable::default();
        assert_eq!(table.classify("JPG"), MediaType::Photo);
        assert_eq!(table.classify("mov"), MediaType::Video);
        assert_eq!(table.classify("cr2"), MediaType::Raw);
        assert_eq!(table.classify("docx"), MediaType::Other);
        assert_eq!(table.classify(""), MediaType::Other);
    }

    #[test]
    fn excluded_extensions() {
        let table = ClassificationTable::default();
        assert!(table.is_excluded("XMP"));
        assert!(!table.is_excluded("jpg"));
    }

    #[test]
    fn capture_timestamp_wins_over_mtime() {
        let capture = NaiveDate::from_ymd_opt(2019, 7, 4)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let mtime = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let (date, source) = choose_date(Some(capture), mtime);
        assert_eq!(date, "2019-07-04");
        assert_eq!(source, DateSource::Exif);

        let (date, source) = choose_date(None, mtime);
        assert_eq!(date, "2023-01-01");
        assert_eq!(source, DateSource::Mtime);
    }

    #[test]
    fn thumbnail_detection() {
        assert!(is_thumbnail(Path::new("/x/IMG_0001.THM")));
        assert!(is_thumbnail(Path::new("/x/beach_thumb.jpg")));
        assert!(!is_thumbnail(Path::new("/x/beach.jpg")));
    }
}
