//! Atomic destination writes
//!
//! Bodies are streamed into a hidden `.part` file created in the destination
//! directory. Only [`PartFile::commit`] moves it to the final path, after the
//! data is synced. Dropping a `PartFile` for any reason (error, retry,
//! cancellation) deletes the temporary file, so a destination path either
//! does not exist or holds a complete body.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::output::path::part_file_prefix;

/// Suffix of in-progress files
pub const PART_SUFFIX: &str = ".part";

/// In-progress download next to its destination.
#[derive(Debug)]
pub struct PartFile {
    file: File,
    path: TempPath,
    destination: PathBuf,
    written: u64,
}

impl PartFile {
    /// Create the part file, creating the destination directory if needed.
    pub async fn create(destination: &Path) -> io::Result<Self> {
        let dir = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let prefix = part_file_prefix(destination);
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(PART_SUFFIX)
                .tempfile_in(&dir)
        })
        .await
        .map_err(io::Error::other)??;

        let (file, path) = named.into_parts();
        Ok(Self {
            file: File::from_std(file),
            path,
            destination: destination.to_path_buf(),
            written: 0,
        })
    }

    /// Append a body chunk.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Temporary location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync and atomically move into place. Returns the bytes written.
    pub async fn commit(self) -> io::Result<u64> {
        let Self {
            mut file,
            path,
            destination,
            written,
        } = self;

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::task::spawn_blocking(move || path.persist(&destination).map_err(|e| e.error))
            .await
            .map_err(io::Error::other)??;
        Ok(written)
    }
}
