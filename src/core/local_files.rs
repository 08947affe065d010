//! Local filesystem primitives shared by the workspace and the publisher.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Recursively copy the contents of `src` into `dst`, preserving relative
/// paths and overwriting existing files. `dst` must already exist.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let entries = fs::read_dir(src)
        .map_err(|e| Error::internal_io(e.to_string(), Some("read source directory".to_string())))?;

    for entry in entries {
        let entry = entry
            .map_err(|e| Error::internal_io(e.to_string(), Some("read directory entry".to_string())))?;
        let target = dst.join(entry.file_name());

        if entry.path().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| Error::internal_io(e.to_string(), Some("create directory".to_string())))?;
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|e| Error::internal_io(e.to_string(), Some("copy file".to_string())))?;
        }
    }

    Ok(())
}

/// Remove every entry of `dir` except the names in `keep`.
///
/// Used to clear a repository working tree while sparing `.git`.
pub fn clear_dir_except(dir: &Path, keep: &[&str]) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::internal_io(e.to_string(), Some("read directory".to_string())))?;

    for entry in entries {
        let entry = entry
            .map_err(|e| Error::internal_io(e.to_string(), Some("read directory entry".to_string())))?;
        let name = entry.file_name();
        if keep.iter().any(|k| name == *k) {
            continue;
        }

        let path = entry.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed
            .map_err(|e| Error::internal_io(e.to_string(), Some("remove entry".to_string())))?;
    }

    Ok(())
}
