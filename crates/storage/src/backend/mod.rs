//! Storage trait and the SFTP implementation.
//!
//! This module defines the `FileStorage` trait, the capability a backend
//! registry dispatches to for each stored file, and [`SftpStorage`], which
//! keeps files on a remote server over SFTP.

mod sftp;

pub use self::sftp::SftpStorage;
use crate::error::{ErrorKind, Operation, OperationError, Result};
use crate::record::{FileRecord, UploadSource};
use async_trait::async_trait;
use exn::ResultExt;
use std::io::{self, Read};
use tokio::sync::oneshot;

/// Download callback. Invoked exactly once, on a blocking thread, with the
/// open remote stream. The stream is only valid for the duration of the call.
pub type Consumer = Box<dyn FnOnce(&mut dyn Read) + Send + 'static>;

/// Unified interface for file storage platforms.
///
/// Every operation is a single request/response cycle: it opens its own
/// connection, does its work, and releases the connection before returning
/// (or raising). Nothing is shared between calls, so one storage handle can
/// serve any number of concurrent tasks.
///
/// # Errors
/// Every failure is an [`OperationError`] naming the operation, the
/// platform and the record; the transport-level cause sits underneath it
/// (see [`cause()`](crate::error::cause)).
///
/// # Examples
///
/// ```
/// use stash_storage::{FileRecord, FileStorage, UploadSource, error::Result};
///
/// async fn replace_avatar(storage: &dyn FileStorage, old: &FileRecord, png: Vec<u8>) -> Result<FileRecord> {
///     let mut record = FileRecord::new("avatars/", "u1-v2.png", "me.png");
///     storage.save(&mut record, UploadSource::from_bytes(png)).await?;
///     if storage.exists(old).await? {
///         storage.delete(old).await?;
///     }
///     Ok(record)
/// }
/// ```
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Name of the configured platform (taken from configuration). Used in
    /// errors and logs only.
    fn platform(&self) -> &str;

    /// Store a file, and its thumbnail if the source carries one.
    ///
    /// Writes the base path and public URL(s) onto `record`, then creates
    /// the record's directory if needed and streams the content across.
    ///
    /// # Notes
    /// - The URL fields are filled in before anything is transferred and
    ///   stay filled in when the save fails. Callers must not treat a
    ///   populated `url` as proof that the file exists.
    /// - On failure one best-effort attempt is made to delete the main
    ///   file. A partially written thumbnail, or a directory created along
    ///   the way, is left behind.
    /// - Thumbnail bytes require `record.thumbnail_filename`; without it the
    ///   save fails before connecting.
    async fn save(&self, record: &mut FileRecord, source: UploadSource) -> Result<()>;

    /// Delete a file and, first, its thumbnail if the record has one.
    ///
    /// A missing file is an error, not a no-op.
    async fn delete(&self, record: &FileRecord) -> Result<()>;

    /// Check whether the main file exists. The thumbnail is not checked.
    ///
    /// Failing to find out is an error, never `false`.
    async fn exists(&self, record: &FileRecord) -> Result<bool>;

    /// Stream the main file into `consumer`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::io::Read;
    /// # use stash_storage::{FileRecord, FileStorage, error::Result};
    /// # async fn example(storage: &dyn FileStorage, record: &FileRecord) -> Result<()> {
    /// storage.download(record, Box::new(|stream: &mut dyn Read| {
    ///     let mut out = std::fs::File::create("/tmp/a.png").unwrap();
    ///     std::io::copy(stream, &mut out).unwrap();
    /// })).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Panics
    /// A panic inside `consumer` is resumed on the caller once the
    /// connection has been released.
    async fn download(&self, record: &FileRecord, consumer: Consumer) -> Result<()>;

    /// Stream the thumbnail into `consumer`.
    ///
    /// Fails without connecting if the record has no thumbnail filename.
    async fn download_thumbnail(&self, record: &FileRecord, consumer: Consumer) -> Result<()>;

    /// Release anything held by the storage itself. Connections are never
    /// held between calls, so there is usually nothing to do.
    fn close(&self) {}

    /// Download the main file into memory.
    async fn download_bytes(&self, record: &FileRecord) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.download(record, collector(tx)).await?;
        collected(rx.await, Operation::Download, self.platform(), record)
    }

    /// Download the thumbnail into memory.
    async fn download_thumbnail_bytes(&self, record: &FileRecord) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.download_thumbnail(record, collector(tx)).await?;
        collected(rx.await, Operation::DownloadThumbnail, self.platform(), record)
    }
}

fn collector(tx: oneshot::Sender<io::Result<Vec<u8>>>) -> Consumer {
    Box::new(move |stream: &mut dyn Read| {
        let mut buffer = Vec::new();
        // Receiver is still waiting; the download hasn't returned yet.
        let _ = tx.send(stream.read_to_end(&mut buffer).map(|_| buffer));
    })
}

fn collected(
    received: std::result::Result<io::Result<Vec<u8>>, oneshot::error::RecvError>,
    operation: Operation,
    platform: &str,
    record: &FileRecord,
) -> Result<Vec<u8>> {
    let read = match received {
        Ok(read) => read,
        Err(_) => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "download finished without reading the stream")),
    };
    read.map_err(ErrorKind::Io).or_raise(|| OperationError::new(operation, platform, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::cause;

    #[tokio::test]
    async fn test_collector_reads_everything() {
        let (tx, rx) = oneshot::channel();
        let consumer = collector(tx);
        consumer(&mut &b"hello world"[..]);
        let record = FileRecord::new("2023/", "a.txt", "a.txt");
        let data = collected(rx.await, Operation::Download, "sftp-1", &record).unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn test_collected_without_callback() {
        let (tx, rx) = oneshot::channel::<io::Result<Vec<u8>>>();
        drop(tx);
        let record = FileRecord::new("2023/", "a.txt", "a.txt");
        let err = collected(rx.await, Operation::Download, "sftp-1", &record).unwrap_err();
        assert_eq!(err.operation, Operation::Download);
        assert!(matches!(cause(&err), Some(ErrorKind::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof));
    }
}
