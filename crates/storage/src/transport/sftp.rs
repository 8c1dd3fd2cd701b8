//! SFTP transport over `russh` + `russh-sftp`.
//!
//! Each connection is a full SSH session: TCP connect, handshake, password
//! login, then the `sftp` subsystem on a single channel. The whole sequence
//! runs under the configured connection timeout; transfers afterwards have
//! no deadline.

use super::{Client, Connector};
use crate::config::SftpConfig;
use crate::error::{ErrorKind, TransportResult};
use crate::path::dir_prefixes;
use crate::record::BoxAsyncRead;
use async_trait::async_trait;
use russh::Disconnect;
use russh::client::{self, Handle};
use russh::keys::ssh_key::{HashAlg, PublicKey};
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Opens a new SSH + SFTP connection per call.
///
/// # Examples
///
/// ```no_run
/// use stash_storage::SftpConfig;
/// use stash_storage::transport::{Connector, SftpConnector};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut config = SftpConfig::new("sftp-1", "files.example.com", "upload");
/// config.password = "secret".to_string();
/// let connector = SftpConnector::new(Arc::new(config));
/// let mut client = connector.connect().await?;
/// println!("{}", client.exists("/data/").await?);
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SftpConnector {
    config: Arc<SftpConfig>,
}
impl SftpConnector {
    pub fn new(config: Arc<SftpConfig>) -> Self {
        Self { config }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    async fn open(&self) -> TransportResult<SftpClient> {
        let endpoint = self.endpoint();
        let handler = HostKeyCheck {
            endpoint: endpoint.clone(),
            expected: self.config.host_fingerprint.clone(),
        };
        let ssh_config = Arc::new(client::Config::default());
        let mut session = client::connect(ssh_config, (self.config.host.as_str(), self.config.port), handler)
            .await
            .map_err(|e| ssh_error(&endpoint, e))?;
        tracing::trace!(endpoint = %endpoint, "SSH handshake complete");

        let auth = session
            .authenticate_password(self.config.user.as_str(), self.config.password.as_str())
            .await
            .map_err(|e| ssh_error(&endpoint, e))?;
        if !auth.success() {
            exn::bail!(ErrorKind::Authentication(self.config.user.clone()));
        }

        let channel = session.channel_open_session().await.map_err(|e| ssh_error(&endpoint, e))?;
        channel.request_subsystem(true, "sftp").await.map_err(|e| ssh_error(&endpoint, e))?;
        let sftp = SftpSession::new(channel.into_stream()).await.map_err(ErrorKind::Sftp)?;
        Ok(SftpClient { sftp, session, endpoint })
    }
}

#[async_trait]
impl Connector for SftpConnector {
    async fn connect(&self) -> TransportResult<Box<dyn Client>> {
        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, self.open()).await {
            Ok(client) => {
                let client = client?;
                tracing::debug!(endpoint = %client.endpoint, "SFTP connection established");
                Ok(Box::new(client))
            },
            Err(_elapsed) => exn::bail!(ErrorKind::Timeout(timeout)),
        }
    }
}

fn ssh_error(endpoint: &str, err: russh::Error) -> ErrorKind {
    match err {
        // Returned by russh when `check_server_key` says no.
        russh::Error::UnknownKey => ErrorKind::HostKey(endpoint.to_string()),
        other => ErrorKind::Network(format!("{endpoint}: {other}")),
    }
}

fn sftp_error(err: SftpError, path: &str) -> ErrorKind {
    let status = match &err {
        SftpError::Status(status) => Some(status.status_code),
        _ => None,
    };
    match status {
        Some(StatusCode::NoSuchFile) => ErrorKind::NotFound(path.to_string()),
        Some(StatusCode::PermissionDenied) => ErrorKind::PermissionDenied(path.to_string()),
        _ => ErrorKind::Sftp(err),
    }
}

/// Whether a server's host key fingerprint is acceptable.
fn host_key_accepted(expected: Option<&str>, actual: &str) -> bool {
    expected.is_none_or(|expected| expected.trim() == actual)
}

struct HostKeyCheck {
    endpoint: String,
    expected: Option<String>,
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        let accepted = host_key_accepted(self.expected.as_deref(), &fingerprint);
        match (&self.expected, accepted) {
            (None, _) => tracing::debug!(endpoint = %self.endpoint, %fingerprint, "Accepting unpinned host key"),
            (Some(_), true) => tracing::trace!(endpoint = %self.endpoint, %fingerprint, "Host key matches"),
            (Some(expected), false) => {
                tracing::warn!(endpoint = %self.endpoint, %fingerprint, %expected, "Host key does not match")
            },
        }
        Ok(accepted)
    }
}

struct SftpClient {
    sftp: SftpSession,
    session: Handle<HostKeyCheck>,
    endpoint: String,
}

#[async_trait]
impl Client for SftpClient {
    async fn exists(&mut self, path: &str) -> TransportResult<bool> {
        Ok(self.sftp.try_exists(path).await.map_err(|e| sftp_error(e, path))?)
    }

    async fn create_dir_all(&mut self, path: &str) -> TransportResult<()> {
        for dir in dir_prefixes(path) {
            if self.sftp.try_exists(dir).await.map_err(|e| sftp_error(e, dir))? {
                continue;
            }
            if let Err(err) = self.sftp.create_dir(dir).await {
                // Lost a race against another client creating the same
                // directory; that's the outcome we wanted anyway.
                if !self.sftp.try_exists(dir).await.unwrap_or(false) {
                    exn::bail!(sftp_error(err, dir));
                }
            }
        }
        Ok(())
    }

    async fn upload(&mut self, path: &str, source: &mut (dyn AsyncRead + Send + Unpin)) -> TransportResult<u64> {
        let mut file = self.sftp.create(path).await.map_err(|e| sftp_error(e, path))?;
        let written = tokio::io::copy(source, &mut file).await.map_err(ErrorKind::Io)?;
        file.shutdown().await.map_err(ErrorKind::Io)?;
        Ok(written)
    }

    async fn delete_file(&mut self, path: &str) -> TransportResult<()> {
        Ok(self.sftp.remove_file(path).await.map_err(|e| sftp_error(e, path))?)
    }

    async fn open_read(&mut self, path: &str) -> TransportResult<BoxAsyncRead> {
        let file = self.sftp.open(path).await.map_err(|e| sftp_error(e, path))?;
        Ok(Box::new(file))
    }

    async fn close(self: Box<Self>) -> TransportResult<()> {
        self.sftp.close().await.map_err(ErrorKind::Sftp)?;
        self.session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| ssh_error(&self.endpoint, e))?;
        tracing::debug!(endpoint = %self.endpoint, "SFTP connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_sftp::protocol::Status;

    fn status(status_code: StatusCode) -> SftpError {
        SftpError::Status(Status {
            id: 1,
            status_code,
            error_message: status_code.to_string(),
            language_tag: "en".to_string(),
        })
    }

    #[test]
    fn test_sftp_error_not_found() {
        let kind = sftp_error(status(StatusCode::NoSuchFile), "/data/a.png");
        assert!(matches!(kind, ErrorKind::NotFound(path) if path == "/data/a.png"));
    }

    #[test]
    fn test_sftp_error_permission_denied() {
        let kind = sftp_error(status(StatusCode::PermissionDenied), "/data/a.png");
        assert!(matches!(kind, ErrorKind::PermissionDenied(path) if path == "/data/a.png"));
    }

    #[test]
    fn test_sftp_error_passthrough() {
        assert!(matches!(sftp_error(status(StatusCode::Failure), "/data"), ErrorKind::Sftp(_)));
        assert!(matches!(sftp_error(SftpError::Timeout, "/data"), ErrorKind::Sftp(SftpError::Timeout)));
    }

    #[test]
    fn test_ssh_error_unknown_key() {
        assert!(matches!(ssh_error("host:22", russh::Error::UnknownKey), ErrorKind::HostKey(e) if e == "host:22"));
        assert!(matches!(ssh_error("host:22", russh::Error::Disconnect), ErrorKind::Network(_)));
    }

    #[test]
    fn test_host_key_accepted() {
        assert!(host_key_accepted(None, "SHA256:abc"));
        assert!(host_key_accepted(Some("SHA256:abc"), "SHA256:abc"));
        assert!(host_key_accepted(Some(" SHA256:abc\n"), "SHA256:abc"));
        assert!(!host_key_accepted(Some("SHA256:abc"), "SHA256:xyz"));
    }

    #[tokio::test]
    async fn test_connect_times_out() {
        // 192.0.2.0/24 is reserved for documentation; nothing answers there.
        let mut config = SftpConfig::new("sftp-1", "192.0.2.1", "upload");
        config.connection_timeout = std::time::Duration::from_millis(50);
        let connector = SftpConnector::new(Arc::new(config));
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Timeout(_) | ErrorKind::Network(_)));
    }
}
