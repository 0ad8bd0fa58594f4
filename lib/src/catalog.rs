//! Media listing and upload placement under the configured source directory.

use std::fs::ReadDir;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::config::DisplayConfig;
use crate::{MEDIA_EXTENSIONS, is_media_file_name};

#[derive(Debug, Error, PartialEq)]
pub enum UploadError {
    #[error("no file name given")]
    Empty,
    #[error("{0:?} is not a supported media type (expected one of: {exts})", exts = MEDIA_EXTENSIONS.join(", "))]
    UnsupportedType(String),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Lazily yields the names of playable files directly under a directory.
/// Call [`list`] again to start over.
pub struct MediaFiles {
    dir: PathBuf,
    entries: ReadDir,
}

impl Iterator for MediaFiles {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        for entry in self.entries.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable entry in {}: {e}", self.dir.display());
                    continue;
                }
            };
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_media_file_name(&name) && entry.path().is_file() {
                return Some(name);
            }
        }
        None
    }
}

pub fn list(config: &DisplayConfig) -> Result<MediaFiles, CatalogError> {
    let dir = config.source_dir.clone();
    let entries = std::fs::read_dir(&dir).map_err(|source| CatalogError::Unreadable {
        path: dir.clone(),
        source,
    })?;
    Ok(MediaFiles { dir, entries })
}

/// Sorted names of the non-hidden subdirectories of the source directory,
/// i.e. the folders a slideshow can be started from.
pub fn list_folders(config: &DisplayConfig) -> Result<Vec<String>, CatalogError> {
    let dir = &config.source_dir;
    let unreadable = |source| CatalogError::Unreadable {
        path: dir.clone(),
        source,
    };
    let mut folders = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.starts_with('.') && entry.path().is_dir() {
            folders.push(name);
        }
    }
    folders.sort();
    Ok(folders)
}

/// Reduces an uploaded file name to its final path component and checks its
/// extension. Returns the name the file will be stored under.
pub fn validate_upload(filename: &str) -> Result<String, UploadError> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() {
        return Err(UploadError::Empty);
    }
    if !is_media_file_name(base) {
        return Err(UploadError::UnsupportedType(base.to_string()));
    }
    Ok(base.to_string())
}

/// Writes an upload into the source directory, replacing any file of the same
/// name. Concurrent uploads of one name each stage in their own temporary
/// file; the last rename wins.
pub async fn store(
    config: &DisplayConfig,
    filename: &str,
    bytes: &[u8],
) -> Result<PathBuf, CatalogError> {
    let name = validate_upload(filename)?;
    let dir = config.source_dir.clone();
    let dest = dir.join(&name);
    let bytes = bytes.to_vec();
    let len = bytes.len();

    let target = dest.clone();
    tokio::task::spawn_blocking(move || place(&dir, &target, &bytes))
        .await
        .map_err(|e| write_error(&dest, io::Error::other(e)))??;
    info!("stored upload {name} ({len} bytes)");
    Ok(dest)
}

fn place(dir: &Path, dest: &Path, bytes: &[u8]) -> Result<(), CatalogError> {
    let mut staged = NamedTempFile::new_in(dir).map_err(|source| write_error(dir, source))?;
    staged
        .write_all(bytes)
        .map_err(|source| write_error(staged.path(), source))?;
    // persist renames over the directory entry itself, so an existing
    // symlink named like the upload is never followed
    staged
        .persist(dest)
        .map_err(|e| write_error(dest, e.error))?;
    Ok(())
}

fn write_error(path: &Path, source: io::Error) -> CatalogError {
    CatalogError::Write {
        path: path.to_path_buf(),
        source,
    }
}
