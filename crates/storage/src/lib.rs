pub mod backend;
pub mod config;
pub mod error;
pub mod path;
mod record;
pub mod transport;

pub use crate::backend::{Consumer, FileStorage, SftpStorage};
pub use crate::config::{Charset, SftpConfig};
pub use crate::record::{BoxAsyncRead, FileRecord, UploadSource};
