//! Configuration Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configuration sources could not be read or parsed.
    #[display("failed to load configuration")]
    Load,
    /// A storage platform entry is unusable as written.
    #[display("invalid configuration for platform `{platform}`: {reason}")]
    Invalid { platform: String, reason: &'static str },
    /// Two enabled entries share a platform name.
    #[display("platform `{_0}` is configured more than once")]
    DuplicatePlatform(#[error(not(source))] String),
    /// The requested platform is not configured (or is disabled).
    #[display("no enabled storage platform named `{_0}`")]
    UnknownPlatform(#[error(not(source))] String),
    /// No platform was requested and there is no single obvious choice.
    #[display("no storage platform selected (set `default_platform` or pass one explicitly)")]
    NoPlatform,
}
impl ErrorKind {
    pub(crate) fn invalid(platform: &str, reason: &'static str) -> Self {
        Self::Invalid {
            platform: platform.to_string(),
            reason,
        }
    }
}
