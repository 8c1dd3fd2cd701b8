//! SFTP storage configuration.

use derive_more::{Display, Error};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;
/// Default limit for establishing a connection (TCP, handshake and login).
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Character set used for remote file names.
///
/// SFTP version 3 puts file names on the wire as UTF-8, so that is the only
/// one on offer. The type exists so configuration can name it explicitly and
/// reject anything else up front.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq)]
pub enum Charset {
    #[default]
    #[display("UTF-8")]
    Utf8,
}
impl FromStr for Charset {
    type Err = UnsupportedCharset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            _ => Err(UnsupportedCharset(s.to_string())),
        }
    }
}

#[derive(Debug, Display, Error)]
#[display("unsupported charset `{_0}` (only UTF-8 is supported)")]
pub struct UnsupportedCharset(#[error(not(source))] pub String);

/// Connection and layout settings for one SFTP storage platform.
///
/// Built once, then shared (behind an [`Arc`](std::sync::Arc)) by every
/// operation of the [`SftpStorage`](crate::backend::SftpStorage) it
/// configures. Nothing mutates it after construction.
///
/// Remote paths are `storage_path + base_path + <record path> + <filename>`
/// and public URLs are `domain + base_path + <record path> + <filename>`,
/// both by plain concatenation; include trailing slashes where needed.
#[derive(Clone, PartialEq, Eq)]
pub struct SftpConfig {
    /// Name of the configured platform (used in errors and logs only)
    pub platform: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub charset: Charset,
    pub connection_timeout: Duration,
    /// Public URL prefix
    pub domain: String,
    /// Logical root segment, recorded onto every file written
    pub base_path: String,
    /// Remote filesystem root
    pub storage_path: String,
    /// Expected server host key fingerprint (`SHA256:...`); any host key is
    /// accepted when unset.
    pub host_fingerprint: Option<String>,
}
impl SftpConfig {
    pub fn new(platform: impl Into<String>, host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: String::new(),
            charset: Charset::default(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            domain: String::new(),
            base_path: String::new(),
            storage_path: "/".to_string(),
            host_fingerprint: None,
        }
    }
}
impl fmt::Debug for SftpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpConfig")
            .field("platform", &self.platform)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("charset", &self.charset)
            .field("connection_timeout", &self.connection_timeout)
            .field("domain", &self.domain)
            .field("base_path", &self.base_path)
            .field("storage_path", &self.storage_path)
            .field("host_fingerprint", &self.host_fingerprint)
            .finish()
    }
}
