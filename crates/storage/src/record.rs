//! File records and upload sources.
//!
//! A [`FileRecord`] is owned by the caller: it is created before upload,
//! filled in by [`save`](crate::FileStorage::save), and read by every later
//! operation. Once written it describes its own location, so deleting or
//! downloading it does not depend on the storage's current configuration.

use crate::path::object_key;
use std::fmt;
use std::io::Cursor;
use tokio::io::AsyncRead;

/// Boxed async byte source, as handed to uploads and returned by downloads.
pub type BoxAsyncRead = Box<dyn AsyncRead + Send + Unpin + 'static>;

/// Descriptor of a logical file stored (or about to be stored) remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileRecord {
    /// Relative directory, e.g. `2023/10/`
    pub path: String,
    /// Stored filename
    pub filename: String,
    /// Stored thumbnail filename, if the file has a thumbnail
    #[cfg_attr(feature = "serde", serde(default))]
    pub thumbnail_filename: Option<String>,
    /// Name of the file as uploaded (diagnostics only)
    #[cfg_attr(feature = "serde", serde(default))]
    pub original_filename: String,
    /// Base path in effect when the file was written
    #[cfg_attr(feature = "serde", serde(default))]
    pub base_path: Option<String>,
    /// Public URL of the file
    #[cfg_attr(feature = "serde", serde(default))]
    pub url: Option<String>,
    /// Public URL of the thumbnail
    #[cfg_attr(feature = "serde", serde(default))]
    pub thumbnail_url: Option<String>,
}
impl FileRecord {
    pub fn new(path: impl Into<String>, filename: impl Into<String>, original_filename: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filename: filename.into(),
            thumbnail_filename: None,
            original_filename: original_filename.into(),
            base_path: None,
            url: None,
            thumbnail_url: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail_filename: impl Into<String>) -> Self {
        self.thumbnail_filename = Some(thumbnail_filename.into());
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Base path recorded at write time; a record that was never written
    /// has an empty base path.
    pub fn recorded_base_path(&self) -> &str {
        self.base_path.as_deref().unwrap_or_default()
    }

    /// Object key of the main file: `base_path + path + filename`.
    pub fn key(&self) -> String {
        object_key(self.recorded_base_path(), &self.path, &self.filename)
    }

    /// Whether the record names a thumbnail (a blank name doesn't count).
    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail_filename.as_deref().is_some_and(|name| !name.trim().is_empty())
    }

    /// Object key of the thumbnail, if the record has one.
    pub fn thumbnail_key(&self) -> Option<String> {
        let thumbnail = self.thumbnail_filename.as_deref()?;
        Some(object_key(self.recorded_base_path(), &self.path, thumbnail))
    }
}

/// The bytes to be stored by [`save`](crate::FileStorage::save): a stream
/// for the main file, and the thumbnail (already rendered, in memory).
pub struct UploadSource {
    pub(crate) content: BoxAsyncRead,
    pub(crate) thumbnail: Option<Vec<u8>>,
}
impl UploadSource {
    pub fn new(content: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            content: Box::new(content),
            thumbnail: None,
        }
    }

    pub fn from_bytes(content: impl Into<Vec<u8>>) -> Self {
        Self::new(Cursor::new(content.into()))
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<Vec<u8>>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail.is_some()
    }
}
impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSource")
            .field("thumbnail_bytes", &self.thumbnail.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_uses_recorded_base_path() {
        let record = FileRecord::new("2023/", "a.png", "cat.png").with_base_path("bucket/");
        assert_eq!(record.key(), "bucket/2023/a.png");
    }

    #[test]
    fn test_key_without_base_path() {
        let record = FileRecord::new("2023/", "a.png", "cat.png");
        assert_eq!(record.recorded_base_path(), "");
        assert_eq!(record.key(), "2023/a.png");
    }

    #[test]
    fn test_thumbnail_key() {
        let record = FileRecord::new("2023/", "a.png", "cat.png").with_base_path("bucket/");
        assert_eq!(record.thumbnail_key(), None);
        let record = record.with_thumbnail("th.a.png");
        assert_eq!(record.thumbnail_key().as_deref(), Some("bucket/2023/th.a.png"));
        assert!(record.has_thumbnail());
        assert!(!record.with_thumbnail(" ").has_thumbnail());
    }

    #[test]
    fn test_upload_source_debug_hides_content() {
        let source = UploadSource::from_bytes(b"data".to_vec()).with_thumbnail(vec![0u8; 12]);
        assert!(source.has_thumbnail());
        assert_eq!(format!("{source:?}"), "UploadSource { thumbnail_bytes: Some(12), .. }");
    }
}
