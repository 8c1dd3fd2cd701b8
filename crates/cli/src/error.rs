//! CLI Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("storage operation failed")]
    Storage,
    #[display("failed to read local file `{}`", _0.display())]
    Read(#[error(not(source))] PathBuf),
    #[display("failed to write local file `{}`", _0.display())]
    Write(#[error(not(source))] PathBuf),
    #[display("failed to write output")]
    Output,
}
