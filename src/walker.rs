use std::{
    fs::Metadata,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::error::{Error, Result};

/// A PDF found in the documents directory.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the documents directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
    /// Last modification time as seconds since the Unix epoch.
    pub mtime: u64,
}

/// Recursively walk a directory and discover PDF documents.
///
/// Skips hidden files/directories (names starting with `.`). The extension
/// check is case-insensitive. Symlinked files are followed, symlinked
/// directories are not. Results are sorted by relative path, which fixes
/// the order entries are appended to the index.
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let root = root.canonicalize().map_err(|e| {
        Error::Config(format!(
            "cannot read documents directory {}: {e}",
            root.display()
        ))
    })?;

    let mut found = Vec::new();
    let mut pending = vec![root.clone()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            let path = entry.path();
            // Broken symlinks have no metadata.
            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };

            if metadata.is_dir() {
                if !entry.file_type()?.is_symlink() {
                    pending.push(path);
                }
            } else if metadata.is_file() && is_pdf(&path) {
                found.push(DiscoveredFile {
                    relative_path: path
                        .strip_prefix(&root)
                        .unwrap_or(&path)
                        .to_path_buf(),
                    absolute_path: path.canonicalize()?,
                    mtime: mtime_secs(&metadata),
                });
            }
        }
    }

    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(found)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn mtime_secs(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
