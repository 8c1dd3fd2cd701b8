//! Command-line arguments.

use clap::{ArgAction, Args, Parser, Subcommand};
use stash_storage::FileRecord;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "stash", version, about = "Store files on an SFTP server")]
pub struct Cli {
    /// Configuration file (defaults to `config.toml` in the user config directory)
    #[arg(short, long, global = true, env = "STASH_CONFIG")]
    pub config: Option<PathBuf>,
    /// Storage platform to use (defaults to `default_platform`)
    #[arg(short, long, global = true)]
    pub platform: Option<String>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}
impl Cli {
    /// Log filter used when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a file (and optionally its thumbnail), printing the stored record as JSON
    Put {
        /// Local file to upload
        file: PathBuf,
        /// Remote directory, relative to the base path (include the trailing slash)
        #[arg(long, default_value = "")]
        dir: String,
        /// Remote filename (defaults to the local filename)
        #[arg(long)]
        name: Option<String>,
        /// Local thumbnail to upload alongside
        #[arg(long, requires = "thumbnail_name")]
        thumbnail: Option<PathBuf>,
        /// Remote thumbnail filename
        #[arg(long, requires = "thumbnail")]
        thumbnail_name: Option<String>,
    },
    /// Print whether a stored file exists
    Exists(Location),
    /// Delete a stored file and its thumbnail
    Rm(Location),
    /// Download a stored file (or its thumbnail)
    Get {
        #[command(flatten)]
        location: Location,
        /// Download the thumbnail instead of the main file
        #[arg(long, requires = "thumbnail_name")]
        thumbnail: bool,
        /// Local file to write
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Where a previously stored file lives.
#[derive(Debug, Clone, Args)]
pub struct Location {
    /// Remote directory, relative to the base path
    #[arg(long, default_value = "")]
    pub dir: String,
    /// Remote filename
    #[arg(long)]
    pub name: String,
    /// Remote thumbnail filename
    #[arg(long)]
    pub thumbnail_name: Option<String>,
    /// Base path the file was stored under (defaults to the configured one)
    #[arg(long)]
    pub base_path: Option<String>,
}
impl Location {
    pub fn record(&self, configured_base_path: &str) -> FileRecord {
        let mut record = FileRecord::new(&self.dir, &self.name, &self.name)
            .with_base_path(self.base_path.as_deref().unwrap_or(configured_base_path));
        record.thumbnail_filename = self.thumbnail_name.clone();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&["stash", "exists", "--name", "a.png"], "warn")]
    #[case(&["stash", "-v", "exists", "--name", "a.png"], "info")]
    #[case(&["stash", "exists", "--name", "a.png", "-vv"], "debug")]
    #[case(&["stash", "-vvvv", "exists", "--name", "a.png"], "trace")]
    fn test_log_level(#[case] args: &[&str], #[case] expected: &str) {
        assert_eq!(Cli::try_parse_from(args).unwrap().log_level(), expected);
    }

    #[test]
    fn test_thumbnail_requires_name() {
        assert!(Cli::try_parse_from(["stash", "put", "a.png", "--thumbnail", "th.png"]).is_err());
        assert!(Cli::try_parse_from(["stash", "get", "--name", "a.png", "--thumbnail", "-o", "out"]).is_err());
    }

    #[test]
    fn test_location_record() {
        let args = ["stash", "rm", "--dir", "2023/", "--name", "a.png", "--thumbnail-name", "th.a.png"];
        let cli = Cli::try_parse_from(args).unwrap();
        let Command::Rm(location) = cli.command else {
            panic!("expected rm");
        };
        let record = location.record("bucket/");
        assert_eq!(record.key(), "bucket/2023/a.png");
        assert_eq!(record.thumbnail_key().as_deref(), Some("bucket/2023/th.a.png"));

        let location = Location {
            base_path: Some("old/".to_string()),
            ..location
        };
        assert_eq!(location.record("bucket/").key(), "old/2023/a.png");
    }
}
