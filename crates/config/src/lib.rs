//! Configuration loading for stash.
//!
//! Sources are merged in order, later ones winning:
//!
//! 1. a TOML file, by default `config.toml` in the platform's config
//!    directory (see [`Config::default_path()`]),
//! 2. environment variables prefixed `STASH_`, with `__` separating nested
//!    keys (e.g. `STASH_DEFAULT_PLATFORM=sftp-2`).
//!
//! ```toml
//! default_platform = "sftp-1"
//!
//! [[sftp]]
//! platform = "sftp-1"
//! host = "files.example.com"
//! user = "upload"
//! password = "secret"
//! domain = "https://cdn.example.com/"
//! base_path = "bucket/"
//! storage_path = "/data/"
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use stash_storage::config::{DEFAULT_CONNECTION_TIMEOUT, DEFAULT_PORT};
use stash_storage::{Charset, SftpConfig};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "STASH_";

/// Fully merged configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Platform used when none is given explicitly
    pub default_platform: Option<String>,
    /// SFTP storage platforms
    pub sftp: Vec<SftpTarget>,
}

/// One `[[sftp]]` entry.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SftpTarget {
    pub platform: String,
    /// Disabled entries are ignored entirely
    pub enable_storage: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub charset: String,
    /// Milliseconds
    pub connection_timeout: u64,
    pub domain: String,
    pub base_path: String,
    pub storage_path: String,
    pub host_fingerprint: Option<String>,
}
impl Default for SftpTarget {
    fn default() -> Self {
        Self {
            platform: String::new(),
            enable_storage: true,
            host: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: String::new(),
            charset: Charset::default().to_string(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT.as_millis() as u64,
            domain: String::new(),
            base_path: String::new(),
            storage_path: "/".to_string(),
            host_fingerprint: None,
        }
    }
}
impl fmt::Debug for SftpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpTarget")
            .field("platform", &self.platform)
            .field("enable_storage", &self.enable_storage)
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
impl SftpTarget {
    /// Check a single entry and build the storage configuration from it.
    pub fn to_sftp_config(&self) -> Result<SftpConfig> {
        if self.platform.trim().is_empty() {
            exn::bail!(ErrorKind::invalid(&self.platform, "platform name is empty"));
        }
        if self.host.trim().is_empty() {
            exn::bail!(ErrorKind::invalid(&self.platform, "host is empty"));
        }
        if self.port == 0 {
            exn::bail!(ErrorKind::invalid(&self.platform, "port must not be 0"));
        }
        let charset = self
            .charset
            .parse::<Charset>()
            .or_raise(|| ErrorKind::invalid(&self.platform, "unsupported charset"))?;

        // Paths are concatenated verbatim; a missing slash fuses two segments.
        if !self.storage_path.ends_with('/') {
            let storage_path = &self.storage_path;
            tracing::warn!(platform = %self.platform, %storage_path, "Storage path has no trailing slash");
        }
        if !self.base_path.is_empty() && !self.base_path.ends_with('/') {
            tracing::warn!(platform = %self.platform, base_path = %self.base_path, "Base path has no trailing slash");
        }

        let mut config = SftpConfig::new(&self.platform, &self.host, &self.user);
        config.port = self.port;
        config.password = self.password.clone();
        config.charset = charset;
        config.connection_timeout = Duration::from_millis(self.connection_timeout);
        config.domain = self.domain.clone();
        config.base_path = self.base_path.clone();
        config.storage_path = self.storage_path.clone();
        config.host_fingerprint = self.host_fingerprint.clone().filter(|f| !f.trim().is_empty());
        Ok(config)
    }
}

impl Config {
    /// Default configuration file location.
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "stash")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("stash.toml"))
    }

    /// Load and validate configuration.
    ///
    /// An explicit `path` must exist; the default location may be absent, in
    /// which case only environment variables apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Toml::file_exact(path),
            None => Toml::file(Self::default_path()),
        };
        Self::from_figment(Figment::new().merge(file).merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate configuration from any set of sources.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Enabled storage platforms.
    pub fn targets(&self) -> impl Iterator<Item = &SftpTarget> {
        self.sftp.iter().filter(|target| target.enable_storage)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for target in self.targets() {
            target.to_sftp_config()?;
            if !seen.insert(target.platform.as_str()) {
                exn::bail!(ErrorKind::DuplicatePlatform(target.platform.clone()));
            }
        }
        if let Some(platform) = &self.default_platform
            && !seen.contains(platform.as_str())
        {
            exn::bail!(ErrorKind::UnknownPlatform(platform.clone()));
        }
        Ok(())
    }

    /// Storage configuration for `platform`, falling back to the default
    /// platform, then to the only enabled platform if there is just one.
    pub fn sftp_config(&self, platform: Option<&str>) -> Result<SftpConfig> {
        let target = match platform.or(self.default_platform.as_deref()) {
            Some(name) => self
                .targets()
                .find(|target| target.platform == name)
                .ok_or_raise(|| ErrorKind::UnknownPlatform(name.to_string()))?,
            None => {
                let mut targets = self.targets();
                match (targets.next(), targets.next()) {
                    (Some(only), None) => only,
                    _ => exn::bail!(ErrorKind::NoPlatform),
                }
            },
        };
        target.to_sftp_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn parse(toml: &str) -> Result<Config> {
        Config::from_figment(Figment::from(Toml::string(toml)))
    }

    const TWO_PLATFORMS: &str = r#"
        default_platform = "sftp-2"

        [[sftp]]
        platform = "sftp-1"
        host = "one.example.com"
        user = "upload"

        [[sftp]]
        platform = "sftp-2"
        host = "two.example.com"
        port = 2222
        user = "upload"
        password = "secret"
        charset = "utf8"
        connection_timeout = 2500
        domain = "https://cdn.example.com/"
        base_path = "bucket/"
        storage_path = "/data/"
        host_fingerprint = "SHA256:abc"
    "#;

    #[test]
    fn test_defaults() {
        let config = parse(
            r#"
            [[sftp]]
            platform = "sftp-1"
            host = "files.example.com"
            user = "upload"
        "#,
        )
        .unwrap();
        let sftp = config.sftp_config(None).unwrap();
        assert_eq!(sftp, SftpConfig::new("sftp-1", "files.example.com", "upload"));
    }

    #[test]
    fn test_all_fields() {
        let config = parse(TWO_PLATFORMS).unwrap();
        let sftp = config.sftp_config(None).unwrap();
        assert_eq!(sftp.platform, "sftp-2");
        assert_eq!(sftp.port, 2222);
        assert_eq!(sftp.password, "secret");
        assert_eq!(sftp.charset, Charset::Utf8);
        assert_eq!(sftp.connection_timeout, Duration::from_millis(2500));
        assert_eq!(sftp.domain, "https://cdn.example.com/");
        assert_eq!(sftp.base_path, "bucket/");
        assert_eq!(sftp.storage_path, "/data/");
        assert_eq!(sftp.host_fingerprint.as_deref(), Some("SHA256:abc"));
    }

    #[test]
    fn test_explicit_platform() {
        let config = parse(TWO_PLATFORMS).unwrap();
        assert_eq!(config.sftp_config(Some("sftp-1")).unwrap().host, "one.example.com");
        let err = config.sftp_config(Some("sftp-3")).unwrap_err();
        assert_eq!(*err, ErrorKind::UnknownPlatform("sftp-3".to_string()));
    }

    #[test]
    fn test_no_obvious_platform() {
        let mut config = parse(TWO_PLATFORMS).unwrap();
        config.default_platform = None;
        assert_eq!(*config.sftp_config(None).unwrap_err(), ErrorKind::NoPlatform);
        assert_eq!(*Config::default().sftp_config(None).unwrap_err(), ErrorKind::NoPlatform);
    }

    #[test]
    fn test_disabled_entries_are_skipped() {
        let config = parse(
            r#"
            [[sftp]]
            platform = "old"
            enable_storage = false

            [[sftp]]
            platform = "new"
            host = "files.example.com"
            user = "upload"
        "#,
        )
        .unwrap();
        assert_eq!(config.targets().count(), 1);
        assert_eq!(config.sftp_config(None).unwrap().platform, "new");
        assert!(config.sftp_config(Some("old")).is_err());
    }

    #[rstest]
    #[case::empty_host(r#"[[sftp]]
        platform = "p"
        user = "u""#)]
    #[case::empty_platform(r#"[[sftp]]
        host = "h""#)]
    #[case::zero_port(r#"[[sftp]]
        platform = "p"
        host = "h"
        port = 0"#)]
    #[case::charset(r#"[[sftp]]
        platform = "p"
        host = "h"
        charset = "GBK""#)]
    fn test_invalid_target(#[case] toml: &str) {
        let err = parse(toml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid { .. }), "{err:?}");
    }

    #[test]
    fn test_duplicate_platform() {
        let err = parse(
            r#"
            [[sftp]]
            platform = "p"
            host = "a"

            [[sftp]]
            platform = "p"
            host = "b"
        "#,
        )
        .unwrap_err();
        assert_eq!(*err, ErrorKind::DuplicatePlatform("p".to_string()));
    }

    #[test]
    fn test_unknown_default_platform() {
        let err = parse(
            r#"
            default_platform = "missing"
            [[sftp]]
            platform = "p"
            host = "h"
        "#,
        )
        .unwrap_err();
        assert_eq!(*err, ErrorKind::UnknownPlatform("missing".to_string()));
    }

    #[test]
    fn test_malformed_toml() {
        let err = parse("[[sftp]\nplatform = ").unwrap_err();
        assert_eq!(*err, ErrorKind::Load);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO_PLATFORMS.as_bytes()).unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.sftp.len(), 2);
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert_eq!(*err, ErrorKind::Load);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = parse(TWO_PLATFORMS).unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
