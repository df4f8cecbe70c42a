//! On-disk upload storage.
//!
//! Uploads stream into a hidden temp file inside the upload directory and are
//! moved to their final name only after every byte is flushed and synced.
//! Dropping a [`PendingUpload`] before [`PendingUpload::commit`] (error path,
//! client disconnect, request timeout) closes the handle and deletes the
//! partial file.

use crate::config::{NamingPolicy, ServerConfig};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

const MAX_ID_LEN: usize = 128;

/// Where and how uploads are written.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    extension: Option<String>,
    naming: NamingPolicy,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, extension: Option<&str>, naming: NamingPolicy) -> Self {
        let extension = extension
            .map(|ext| ext.trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
            .map(str::to_string);

        Self {
            dir: dir.into(),
            extension,
            naming,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.upload_dir.clone(),
            config.file_extension.as_deref(),
            config.naming,
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the upload directory if needed. Called once before binding.
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Identifiers become file names, so only a conservative alphabet passes:
    /// ASCII alphanumerics plus `-`, `_` and `.`, no leading dot, no separators.
    pub fn is_valid_id(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= MAX_ID_LEN
            && !id.starts_with('.')
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    }

    fn file_name(&self, stem: &str) -> String {
        match &self.extension {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem.to_string(),
        }
    }

    /// Open a temp file for `id`. The caller must have validated `id`.
    pub async fn begin(&self, id: &str) -> io::Result<PendingUpload> {
        debug_assert!(Self::is_valid_id(id));

        let final_name = match self.naming {
            NamingPolicy::Exact => self.file_name(id),
            NamingPolicy::Unique => {
                self.file_name(&format!("{id}-{}", uuid::Uuid::new_v4().simple()))
            }
        };

        let dir = self.dir.clone();
        let prefix = format!(".{id}.");
        let (file, temp) = tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix(&prefix).suffix(".partial");
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                builder.permissions(std::fs::Permissions::from_mode(0o644));
            }
            builder.tempfile_in(&dir).map(|f| f.into_parts())
        })
        .await
        .map_err(io::Error::other)??;

        Ok(PendingUpload {
            file: File::from_std(file),
            temp,
            dest: self.dir.join(&final_name),
            naming: self.naming,
            written: 0,
        })
    }
}

/// An upload in progress. Holds the open temp file until committed or dropped.
#[derive(Debug)]
pub struct PendingUpload {
    file: File,
    temp: TempPath,
    dest: PathBuf,
    naming: NamingPolicy,
    written: u64,
}

impl PendingUpload {
    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flush, close and move the file into place. Returns the final path.
    pub async fn commit(self) -> io::Result<StoredFile> {
        let PendingUpload {
            mut file,
            temp,
            dest,
            naming,
            written,
        } = self;

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let target = dest.clone();
        tokio::task::spawn_blocking(move || match naming {
            // rename(2) replaces atomically; concurrent writers to one id
            // never interleave, the last commit wins.
            NamingPolicy::Exact => temp.persist(&target),
            NamingPolicy::Unique => temp.persist_noclobber(&target),
        })
        .await
        .map_err(io::Error::other)?
        .map_err(|e| e.error)?;

        Ok(StoredFile {
            path: dest,
            bytes: written,
        })
    }
}

/// A committed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub bytes: u64,
}
