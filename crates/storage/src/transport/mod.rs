//! Remote file transfer clients.
//!
//! A [`Connector`] is the connection factory: every call to
//! [`connect()`](Connector::connect) opens a brand new [`Client`] that
//! belongs to exactly one storage operation. Nothing is pooled or shared
//! between operations; the SSH client underneath isn't meant to be kept
//! around as a long-lived singleton.
//!
//! # Releasing clients
//! The operation that opened a client owns it, calls
//! [`close()`](Client::close) on the way out, and relies on `Drop` to tear
//! the connection down on every other exit path (panics, cancelled
//! futures). Implementations must release everything they hold on drop.

#[cfg(any(test, feature = "mock"))]
mod mock;
mod sftp;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::{Fault, MockConnector, Op};
pub use self::sftp::SftpConnector;
use crate::error::TransportResult;
use crate::record::BoxAsyncRead;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Connection factory.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new, unshared client.
    async fn connect(&self) -> TransportResult<Box<dyn Client>>;
}

/// A single open connection to a remote file server.
///
/// All paths are remote absolute paths, already composed by the caller.
#[async_trait]
pub trait Client: Send {
    /// Check whether a file or directory exists.
    async fn exists(&mut self, path: &str) -> TransportResult<bool>;

    /// Create a directory and any missing parents.
    ///
    /// Must succeed if the directory already exists, including when another
    /// client creates it concurrently.
    async fn create_dir_all(&mut self, path: &str) -> TransportResult<()>;

    /// Stream `source` into the file at `path`, creating or truncating it.
    /// The parent directory must already exist.
    ///
    /// Returns the number of bytes written.
    async fn upload(&mut self, path: &str, source: &mut (dyn AsyncRead + Send + Unpin)) -> TransportResult<u64>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete_file(&mut self, path: &str) -> TransportResult<()>;

    /// Open a file for streaming reads.
    ///
    /// The returned stream is only valid while this client is open.
    async fn open_read(&mut self, path: &str) -> TransportResult<BoxAsyncRead>;

    /// Gracefully close the connection.
    async fn close(self: Box<Self>) -> TransportResult<()>;
}

/// Close a client, logging (not raising) a failed goodbye. By the time this
/// runs the operation's outcome is already decided.
pub(crate) async fn release(client: Box<dyn Client>, platform: &str) {
    if let Err(err) = client.close().await {
        tracing::warn!(platform, error = %err, "Failed to close connection cleanly");
    }
}
