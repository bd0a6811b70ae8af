//! SHA-256 manifest of an output tree
//!
//! Produces the `sha256sum` text format (`<hex>  <relative/path>`), sorted by
//! path, so two runs can be compared with a plain diff or checked with
//! `sha256sum -c` from inside the output directory.

use crate::error::{ConvertError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Name of the manifest file when no path is given
pub const DEFAULT_MANIFEST_NAME: &str = "checksums.sha256";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// Path relative to the tree root, `/`-separated
    pub path: String,
    /// Lowercase hex SHA-256 digest
    pub sha256: String,
}

/// Hash one file, streaming its contents
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| ConvertError::file_io_error("open file for hashing", path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| ConvertError::file_io_error("read file for hashing", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(buf.get(..n).unwrap_or_default());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash every regular file below `root` (links are followed)
pub fn compute_manifest(root: &Path) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
            ConvertError::file_io_error("walk output tree", path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let sha256 = hash_file(entry.path())?;
        debug!(path = %path, sha256 = %sha256, "Hashed file");
        entries.push(ManifestEntry { path, sha256 });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Render entries in `sha256sum` format
#[must_use]
pub fn render(entries: &[ManifestEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}  {}\n", e.sha256, e.path))
        .collect()
}

/// Hash the tree below `root` and write the manifest to `dest`
pub fn write_manifest(root: &Path, dest: &Path) -> Result<Vec<ManifestEntry>> {
    // Drop a stale manifest first so it cannot end up hashed
    if dest.is_file() {
        std::fs::remove_file(dest)
            .map_err(|e| ConvertError::file_io_error("replace manifest", dest, e))?;
    }
    let entries = compute_manifest(root)?;
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConvertError::file_io_error("create directory", parent, e))?;
    }
    std::fs::write(dest, render(&entries))
        .map_err(|e| ConvertError::file_io_error("write manifest", dest, e))?;
    info!(path = %dest.display(), files = entries.len(), "Wrote checksum manifest");
    Ok(entries)
}

/// Default manifest location next to, not inside, the output tree
#[must_use]
pub fn default_manifest_path(output_dir: &Path) -> PathBuf {
    let name = output_dir
        .file_name()
        .map_or_else(|| "output".into(), |n| n.to_string_lossy());
    output_dir.with_file_name(format!("{name}.{DEFAULT_MANIFEST_NAME}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_hash_file_known_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_manifest_is_sorted_and_relative() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("trainA")).unwrap();
        fs::create_dir_all(dir.path().join("testB")).unwrap();
        fs::write(dir.path().join("trainA/2.png"), b"2").unwrap();
        fs::write(dir.path().join("trainA/1.png"), b"1").unwrap();
        fs::write(dir.path().join("testB/3.png"), b"3").unwrap();

        let entries = compute_manifest(dir.path()).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["testB/3.png", "trainA/1.png", "trainA/2.png"]);

        let text = render(&entries);
        assert_eq!(text.lines().count(), 3);
        for (line, entry) in text.lines().zip(&entries) {
            assert_eq!(line, format!("{}  {}", entry.sha256, entry.path));
            assert_eq!(entry.sha256.len(), 64);
        }
    }

    #[test]
    fn test_write_manifest_inside_tree_excludes_itself() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.png"), b"a").unwrap();
        let dest = dir.path().join(DEFAULT_MANIFEST_NAME);

        write_manifest(dir.path(), &dest).unwrap();
        let entries = write_manifest(dir.path(), &dest).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read_to_string(&dest).unwrap(), render(&entries));
    }

    #[test]
    fn test_default_manifest_path() {
        assert_eq!(
            default_manifest_path(Path::new("/data/celeba_male")),
            PathBuf::from("/data/celeba_male.checksums.sha256")
        );
    }
}
