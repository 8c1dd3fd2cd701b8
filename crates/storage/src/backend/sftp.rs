//! SFTP storage backend.
//!
//! Files live on a remote server at
//! `storage_path + base_path + <record path> + <filename>`. Every operation
//! opens its own connection through a [`Connector`] and releases it before
//! returning, whatever the outcome.

use crate::backend::{Consumer, FileStorage};
use crate::config::SftpConfig;
use crate::error::{ErrorKind, Operation, OperationError, Result, TransportResult};
use crate::path::absolute_path;
use crate::record::{FileRecord, UploadSource};
use crate::transport::{Client, Connector, SftpConnector, release};
use async_trait::async_trait;
use exn::{ErrorExt, ResultExt};
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::io::SyncIoBridge;
use tracing::instrument;

/// SFTP storage backend.
///
/// # Examples
///
/// ```no_run
/// use stash_storage::{FileRecord, FileStorage, SftpConfig, SftpStorage, UploadSource};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut config = SftpConfig::new("sftp-1", "files.example.com", "upload");
/// config.password = "secret".to_string();
/// config.domain = "https://cdn.example.com/".to_string();
/// config.base_path = "bucket/".to_string();
/// config.storage_path = "/data/".to_string();
/// let storage = SftpStorage::new(config);
///
/// let mut record = FileRecord::new("2023/", "5f2c.png", "cat.png");
/// storage.save(&mut record, UploadSource::from_bytes(std::fs::read("cat.png")?)).await?;
/// assert_eq!(record.url.as_deref(), Some("https://cdn.example.com/bucket/2023/5f2c.png"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SftpStorage {
    config: Arc<SftpConfig>,
    connector: Arc<dyn Connector>,
}
impl SftpStorage {
    /// Create a storage that connects over SSH with the given configuration.
    pub fn new(config: SftpConfig) -> Self {
        let config = Arc::new(config);
        let connector = Arc::new(SftpConnector::new(Arc::clone(&config)));
        Self { config, connector }
    }

    /// Create a storage that gets its connections from `connector` instead.
    pub fn with_connector(config: SftpConfig, connector: impl Connector + 'static) -> Self {
        Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
        }
    }

    pub fn config(&self) -> &SftpConfig {
        &self.config
    }

    fn absolute(&self, key: &str) -> String {
        absolute_path(&self.config.storage_path, key)
    }

    fn public_url(&self, key: &str) -> String {
        [self.config.domain.as_str(), key].concat()
    }

    /// Open `key` and hand the stream to `consumer` on a blocking thread.
    async fn stream_to(&self, operation: Operation, record: &FileRecord, key: &str, consumer: Consumer) -> Result<()> {
        let context = || OperationError::new(operation, &self.config.platform, record);
        let path = self.absolute(key);
        let mut client = self.connector.connect().await.or_raise(context)?;
        let stream = match client.open_read(&path).await {
            Ok(stream) => stream,
            Err(err) => {
                release(client, &self.config.platform).await;
                return Err(err).or_raise(context);
            },
        };

        // The bridge has to be built here, inside the runtime; the consumer
        // drops it (and the remote file handle) as soon as it returns.
        let mut bridge = SyncIoBridge::new(stream);
        let outcome = tokio::task::spawn_blocking(move || consumer(&mut bridge)).await;
        release(client, &self.config.platform).await;
        match outcome {
            Ok(()) => Ok(()),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(ErrorKind::Io(io::Error::other(err))).or_raise(context),
        }
    }
}
impl fmt::Debug for SftpStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpStorage").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Ensure the directory exists, then upload the main file and the thumbnail.
async fn transfer(
    client: &mut dyn Client,
    directory: &str,
    path: &str,
    content: &mut (dyn AsyncRead + Send + Unpin),
    thumbnail: Option<(String, Vec<u8>)>,
) -> TransportResult<u64> {
    if !client.exists(directory).await? {
        client.create_dir_all(directory).await?;
    }
    let mut written = client.upload(path, content).await?;
    if let Some((thumbnail_path, bytes)) = thumbnail {
        written += client.upload(&thumbnail_path, &mut bytes.as_slice()).await?;
    }
    Ok(written)
}

async fn remove(client: &mut dyn Client, paths: &[String]) -> TransportResult<()> {
    for path in paths {
        client.delete_file(path).await?;
    }
    Ok(())
}

#[async_trait]
impl FileStorage for SftpStorage {
    fn platform(&self) -> &str {
        &self.config.platform
    }

    #[instrument(skip_all, fields(platform = %self.config.platform, file = %record.original_filename))]
    async fn save(&self, record: &mut FileRecord, source: UploadSource) -> Result<()> {
        if source.has_thumbnail() && !record.has_thumbnail() {
            return Err(ErrorKind::MissingThumbnail.raise())
                .or_raise(|| OperationError::new(Operation::Upload, &self.config.platform, record));
        }
        let UploadSource { mut content, thumbnail } = source;

        record.base_path = Some(self.config.base_path.clone());
        let key = record.key();
        record.url = Some(self.public_url(&key));
        let thumbnail = match (thumbnail, record.thumbnail_key()) {
            (Some(bytes), Some(thumbnail_key)) => {
                record.thumbnail_url = Some(self.public_url(&thumbnail_key));
                Some((self.absolute(&thumbnail_key), bytes))
            },
            _ => None,
        };

        let record: &FileRecord = record;
        let context = || OperationError::new(Operation::Upload, &self.config.platform, record);
        let directory = self.absolute(&[record.recorded_base_path(), record.path.as_str()].concat());
        let path = self.absolute(&key);

        // Nothing has been written if this fails, so there's nothing to clean up.
        let mut client = self.connector.connect().await.or_raise(context)?;
        let result = transfer(client.as_mut(), &directory, &path, content.as_mut(), thumbnail).await;
        if result.is_err()
            && let Err(err) = client.delete_file(&path).await
        {
            tracing::debug!(path = %path, error = %err, "Discarding failed cleanup of incomplete upload");
        }
        release(client, &self.config.platform).await;

        let written = result.or_raise(context)?;
        tracing::info!(key = %key, bytes = written, "Stored file");
        Ok(())
    }

    #[instrument(skip_all, fields(platform = %self.config.platform, key = %record.key()))]
    async fn delete(&self, record: &FileRecord) -> Result<()> {
        let context = || OperationError::new(Operation::Delete, &self.config.platform, record);
        // Thumbnail first; a failure part way leaves the main file in place.
        let paths: Vec<String> =
            record.thumbnail_key().into_iter().chain([record.key()]).map(|key| self.absolute(&key)).collect();

        let mut client = self.connector.connect().await.or_raise(context)?;
        let result = remove(client.as_mut(), &paths).await;
        release(client, &self.config.platform).await;

        result.or_raise(context)?;
        tracing::info!(files = paths.len(), "Deleted file");
        Ok(())
    }

    #[instrument(skip_all, fields(platform = %self.config.platform, key = %record.key()))]
    async fn exists(&self, record: &FileRecord) -> Result<bool> {
        let context = || OperationError::new(Operation::Exists, &self.config.platform, record);
        let path = self.absolute(&record.key());

        let mut client = self.connector.connect().await.or_raise(context)?;
        let result = client.exists(&path).await;
        release(client, &self.config.platform).await;

        result.or_raise(context)
    }

    #[instrument(skip_all, fields(platform = %self.config.platform, key = %record.key()))]
    async fn download(&self, record: &FileRecord, consumer: Consumer) -> Result<()> {
        self.stream_to(Operation::Download, record, &record.key(), consumer).await
    }

    #[instrument(skip_all, fields(platform = %self.config.platform, key = %record.key()))]
    async fn download_thumbnail(&self, record: &FileRecord, consumer: Consumer) -> Result<()> {
        let Some(key) = record.thumbnail_key().filter(|_| record.has_thumbnail()) else {
            return Err(ErrorKind::MissingThumbnail.raise())
                .or_raise(|| OperationError::new(Operation::DownloadThumbnail, &self.config.platform, record));
        };
        self.stream_to(Operation::DownloadThumbnail, record, &key, consumer).await
    }
}
