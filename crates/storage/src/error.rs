//! Storage Error Types
//!
//! Every public [`FileStorage`](crate::FileStorage) operation fails with a
//! single error kind, [`OperationError`], which names the operation, the
//! platform that performed it and (where there is one) the record it acted
//! on. The root cause sits underneath it in the `exn` error tree as a
//! transport-level [`ErrorKind`].

use crate::record::FileRecord;
use derive_more::{Display, Error};
use std::fmt;
use std::io::Error as IoError;
use std::time::Duration;

/// A storage operation error with automatic location tracking.
pub type Error = exn::Exn<OperationError>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A transport error, the cause underneath an [`OperationError`].
pub type TransportError = exn::Exn<ErrorKind>;
/// Result type alias for transport calls.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// The storage operation that failed.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    #[display("upload file")]
    Upload,
    #[display("delete file")]
    Delete,
    #[display("check file existence")]
    Exists,
    #[display("download file")]
    Download,
    #[display("download thumbnail")]
    DownloadThumbnail,
}

/// The error raised by every storage operation.
///
/// Uploads are described by the record's original filename (the remote
/// names are usually generated), every other operation by the record's
/// object key.
#[derive(Debug, Error)]
pub struct OperationError {
    pub operation: Operation,
    pub platform: String,
    pub record: Option<FileRecord>,
}
impl OperationError {
    pub fn new(operation: Operation, platform: impl Into<String>, record: &FileRecord) -> Self {
        Self {
            operation,
            platform: platform.into(),
            record: Some(record.clone()),
        }
    }
}
impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to {} (platform: {}", self.operation, self.platform)?;
        match (&self.record, self.operation) {
            (Some(record), Operation::Upload) => write!(f, ", filename: {})", record.original_filename),
            (Some(record), _) => write!(f, ", file: {})", record.key()),
            (None, _) => write!(f, ")"),
        }
    }
}

/// Transport-level failure categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Remote file or directory does not exist
    #[display("remote file not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Server refused access to a remote path
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Underlying I/O error (local source stream or socket)
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// TCP connection or SSH session failure
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Connection could not be established within the configured timeout
    #[display("connection timed out after {}ms", _0.as_millis())]
    Timeout(#[error(not(source))] Duration),
    /// Server rejected the configured credentials
    #[display("authentication rejected for user `{_0}`")]
    Authentication(#[error(not(source))] String),
    /// Server host key did not match the configured fingerprint
    #[display("host key verification failed for {_0}")]
    HostKey(#[error(not(source))] String),
    /// SFTP protocol error not covered by a more specific category
    #[display("SFTP error: {_0}")]
    Sftp(russh_sftp::client::error::Error),
    /// Thumbnail requested or supplied for a record without a thumbnail filename
    #[display("record has no thumbnail filename")]
    MissingThumbnail,
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

/// Find the first transport-level cause in an operation error's tree.
///
/// ```
/// use stash_storage::error::{ErrorKind, Operation, OperationError, cause};
/// use stash_storage::FileRecord;
///
/// let record = FileRecord::new("2023/", "a.png", "cat.png");
/// let err = exn::Exn::new(ErrorKind::MissingThumbnail)
///     .raise(OperationError::new(Operation::DownloadThumbnail, "sftp-1", &record));
/// assert!(matches!(cause(&err), Some(ErrorKind::MissingThumbnail)));
/// ```
pub fn cause(err: &Error) -> Option<&ErrorKind> {
    fn walk(frame: &exn::Frame) -> Option<&ErrorKind> {
        frame.children().iter().find_map(|child| child.error().downcast_ref::<ErrorKind>().or_else(|| walk(child)))
    }
    walk(err.frame())
}

#[cfg(test)]
mod tests {
    use super::*;
    use exn::ResultExt;

    fn record() -> FileRecord {
        let mut record = FileRecord::new("2023/", "5f2c.png", "cat.png");
        record.base_path = Some("bucket/".to_string());
        record
    }

    #[test]
    fn test_upload_display_uses_original_filename() {
        let err = OperationError::new(Operation::Upload, "sftp-1", &record());
        assert_eq!(err.to_string(), "failed to upload file (platform: sftp-1, filename: cat.png)");
    }

    #[test]
    fn test_display_uses_object_key() {
        let err = OperationError::new(Operation::Delete, "sftp-1", &record());
        assert_eq!(err.to_string(), "failed to delete file (platform: sftp-1, file: bucket/2023/5f2c.png)");
    }

    #[test]
    fn test_display_without_record() {
        let err = OperationError {
            operation: Operation::Exists,
            platform: "sftp-1".to_string(),
            record: None,
        };
        assert_eq!(err.to_string(), "failed to check file existence (platform: sftp-1)");
    }

    #[test]
    fn test_cause_walks_nested_frames() {
        let inner: TransportResult<()> = Err(exn::Exn::new(ErrorKind::NotFound("/data/a.png".to_string())));
        let err = inner.or_raise(|| OperationError::new(Operation::Delete, "sftp-1", &record())).unwrap_err();
        assert!(matches!(cause(&err), Some(ErrorKind::NotFound(path)) if path == "/data/a.png"));
    }

    #[test]
    fn test_cause_absent() {
        let err = exn::Exn::new(OperationError::new(Operation::Exists, "sftp-1", &record()));
        assert!(cause(&err).is_none());
    }
}
