//! Command execution against a storage platform.

use crate::cli::Command;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use stash_storage::{Consumer, FileRecord, FileStorage, UploadSource};
use std::io::{self, Read, Write};
use std::path::Path;
use tokio::sync::oneshot;

/// Run a single command, writing its result to `out`.
///
/// `base_path` is the configured base path, used for files whose stored base
/// path isn't given on the command line.
pub async fn execute(command: Command, storage: &dyn FileStorage, base_path: &str, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Put { file, dir, name, thumbnail, thumbnail_name } => {
            let name = match name {
                Some(name) => name,
                None => file_name(&file)?,
            };
            let mut record = FileRecord::new(dir, name, file_name(&file)?);
            record.thumbnail_filename = thumbnail_name;

            let content = tokio::fs::File::open(&file).await.or_raise(|| ErrorKind::Read(file.clone()))?;
            let mut source = UploadSource::new(content);
            if let Some(thumbnail) = thumbnail {
                let bytes = tokio::fs::read(&thumbnail).await.or_raise(|| ErrorKind::Read(thumbnail.clone()))?;
                source = source.with_thumbnail(bytes);
            }

            storage.save(&mut record, source).await.or_raise(|| ErrorKind::Storage)?;
            serde_json::to_writer_pretty(&mut *out, &record).or_raise(|| ErrorKind::Output)?;
            writeln!(out).or_raise(|| ErrorKind::Output)?;
        },
        Command::Exists(location) => {
            let exists = storage.exists(&location.record(base_path)).await.or_raise(|| ErrorKind::Storage)?;
            writeln!(out, "{exists}").or_raise(|| ErrorKind::Output)?;
        },
        Command::Rm(location) => {
            storage.delete(&location.record(base_path)).await.or_raise(|| ErrorKind::Storage)?;
        },
        Command::Get { location, thumbnail, output } => {
            let record = location.record(base_path);
            let file = std::fs::File::create(&output).or_raise(|| ErrorKind::Write(output.clone()))?;
            let (tx, rx) = oneshot::channel();
            let consumer: Consumer = Box::new(move |stream: &mut dyn Read| {
                let mut file = file;
                let _ = tx.send(io::copy(stream, &mut file).and_then(|bytes| file.sync_all().map(|()| bytes)));
            });
            let downloaded = if thumbnail {
                storage.download_thumbnail(&record, consumer).await
            } else {
                storage.download(&record, consumer).await
            };
            downloaded.or_raise(|| ErrorKind::Storage)?;

            let copied = rx.await.unwrap_or_else(|_| Err(io::ErrorKind::UnexpectedEof.into()));
            let bytes = copied.or_raise(|| ErrorKind::Write(output.clone()))?;
            tracing::info!(path = %output.display(), bytes, "Downloaded file");
        },
    }
    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => Ok(name.to_string()),
        None => exn::bail!(ErrorKind::Read(path.to_path_buf())),
    }
}
