//! Transient per-version working area.
//!
//! A workspace holds the raw download and the stripped artifact tree for one
//! version. The directory lives under the configured work dir with a random
//! suffix, and the whole tree is deleted when the workspace is dropped, so
//! every exit path — success, tool failure, publish failure — releases it.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{Error, Result};

const PREFIX: &str = "shelver-";

pub struct Workspace {
    root: TempDir,
    download: PathBuf,
    stripped: PathBuf,
}

impl Workspace {
    /// Allocate a fresh workspace under `base` with `download/` and
    /// `stripped/` created eagerly.
    pub fn create(base: &Path) -> Result<Self> {
        std::fs::create_dir_all(base)
            .map_err(|e| Error::workspace_io(e.to_string(), "create work dir"))?;

        let root = tempfile::Builder::new()
            .prefix(PREFIX)
            .tempdir_in(base)
            .map_err(|e| Error::workspace_io(e.to_string(), "allocate workspace"))?;

        let download = root.path().join("download");
        let stripped = root.path().join("stripped");
        std::fs::create_dir(&download)
            .map_err(|e| Error::workspace_io(e.to_string(), "create download dir"))?;
        std::fs::create_dir(&stripped)
            .map_err(|e| Error::workspace_io(e.to_string(), "create stripped dir"))?;

        Ok(Self {
            root,
            download,
            stripped,
        })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Target directory for the raw downloaded build.
    pub fn download(&self) -> &Path {
        &self.download
    }

    /// Target directory for the stripped artifact tree.
    pub fn stripped(&self) -> &Path {
        &self.stripped
    }

    /// Delete the workspace tree now, surfacing the I/O error.
    ///
    /// Dropping a workspace deletes it too; this exists for the success path
    /// where a deletion failure should be reported rather than swallowed.
    pub fn dispose(self) -> Result<()> {
        self.root
            .close()
            .map_err(|e| Error::workspace_io(e.to_string(), "remove workspace"))
    }
}
