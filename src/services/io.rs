//! File transfer operations service
//!
//! This module separates filesystem side effects from the routing logic,
//! so planning can be tested without touching the disk.

use crate::{
    config::TransferMode,
    error::{ConvertError, Result},
};
use std::collections::BTreeSet;
use std::path::Path;

/// Service placing source images into the output tree
pub struct FileTransferService;

impl FileTransferService {
    /// Place `source` at `dest` using `mode`.
    ///
    /// An existing entry at `dest` is removed first, so re-running replaces
    /// previous output and never writes through an old link into the source.
    ///
    /// # Returns
    /// * `Ok(u64)` - Size of the transferred image in bytes
    /// * `Err(ConvertError::Io)` - Source missing or unreadable, destination unwritable
    ///
    /// # Examples
    /// ```rust,no_run
    /// use celeba_cyclegan::{services::FileTransferService, TransferMode};
    /// use std::path::Path;
    ///
    /// FileTransferService::transfer(
    ///     Path::new("img_align_celeba_png/000001.png"),
    ///     Path::new("celeba_male/trainA/000001.png"),
    ///     TransferMode::Copy,
    /// )?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn transfer(source: &Path, dest: &Path, mode: TransferMode) -> Result<u64> {
        let metadata = std::fs::metadata(source)
            .map_err(|e| ConvertError::file_io_error("read source image", source, e))?;
        if !metadata.is_file() {
            return Err(ConvertError::file_io_error(
                "read source image",
                source,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        Self::remove_existing(dest)?;

        match mode {
            TransferMode::Copy => std::fs::copy(source, dest)
                .map_err(|e| ConvertError::file_io_error("copy image to", dest, e)),
            TransferMode::Symlink => {
                let target = source
                    .canonicalize()
                    .map_err(|e| ConvertError::file_io_error("resolve source image", source, e))?;
                symlink_file(&target, dest)
                    .map_err(|e| ConvertError::file_io_error("symlink image at", dest, e))?;
                Ok(metadata.len())
            },
            TransferMode::Hardlink => {
                std::fs::hard_link(source, dest)
                    .map_err(|e| ConvertError::file_io_error("hard link image at", dest, e))?;
                Ok(metadata.len())
            },
        }
    }

    /// Create `path` and its parents; succeeds if it already exists
    pub fn ensure_dir(path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .map_err(|e| ConvertError::file_io_error("create directory", path, e))
    }

    fn remove_existing(dest: &Path) -> Result<()> {
        match std::fs::symlink_metadata(dest) {
            Ok(meta) if meta.is_dir() => Err(ConvertError::file_io_error(
                "replace",
                dest,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "a directory is in the way"),
            )),
            Ok(_) => std::fs::remove_file(dest)
                .map_err(|e| ConvertError::file_io_error("replace existing file", dest, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConvertError::file_io_error("inspect destination", dest, e)),
        }
    }
}

#[cfg(unix)]
fn symlink_file(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_file(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink_file(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

/// Check if file has the given extension (case-insensitive)
#[must_use]
pub fn is_image_file(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Filenames of the images directly inside `dir`, sorted
pub fn scan_source_images(dir: &Path, extension: &str) -> Result<BTreeSet<String>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ConvertError::file_io_error("read source directory", dir, e))?;

    let mut files = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConvertError::file_io_error("read source directory", dir, e))?;
        let path = entry.path();
        if path.is_file() && is_image_file(&path, extension) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                files.insert(name.to_string());
            }
        }
    }

    Ok(files)
}
