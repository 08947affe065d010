//! Version manifest loading.
//!
//! The manifest is a JSON array of `{version, manifest}` records. Its order is
//! the processing order and is preserved verbatim; duplicates are not
//! collapsed here (the publisher's idempotence check makes a duplicate a
//! skip).

use std::path::Path;

use semver::Version;
use serde::Deserialize;

use crate::error::{Error, Result};

/// One archived application version: the semver identity used for branch
/// naming, and the opaque token the download tool resolves to a build.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub version: Version,
    pub manifest: String,
}

/// Load the ordered list of version entries from a manifest file.
pub fn load(path: &Path) -> Result<Vec<VersionEntry>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::manifest_not_found(path.to_string_lossy())
        } else {
            Error::internal_io(e.to_string(), Some("read manifest".to_string()))
        }
    })?;

    let entries: Vec<VersionEntry> = serde_json::from_str(&content)
        .map_err(|e| Error::manifest_invalid_json(path.to_string_lossy(), &e))?;

    if entries.is_empty() {
        return Err(Error::manifest_empty(path.to_string_lossy()));
    }

    for (index, entry) in entries.iter().enumerate() {
        if entry.manifest.trim().is_empty() {
            return Err(Error::manifest_invalid_entry(
                index,
                "empty manifest identifier",
            ));
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::tempdir;

    fn write_manifest(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("versions.json");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_entries_in_manifest_order() {
        let (_dir, path) = write_manifest(
            r#"[
                {"version": "1.13.2", "manifest": "AAA"},
                {"version": "1.0.0", "manifest": "BBB"}
            ]"#,
        );
        let entries = load(&path).unwrap();
        assert_eq!(entries.len(), 2);
        // Manifest order is publish order, not semver order.
        assert_eq!(entries[0].version.to_string(), "1.13.2");
        assert_eq!(entries[1].version.to_string(), "1.0.0");
        assert_eq!(entries[0].manifest, "AAA");
    }

    #[test]
    fn missing_file_is_manifest_not_found() {
        let dir = tempdir().unwrap();
        let err = load(&dir.path().join("nope.json")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ManifestNotFound);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let (_dir, path) = write_manifest("{not json");
        let err = load(&path).unwrap_err();
        assert_eq!(err.code, ErrorCode::ManifestInvalidJson);
    }

    #[test]
    fn invalid_version_string_is_rejected() {
        let (_dir, path) = write_manifest(r#"[{"version": "", "manifest": "AAA"}]"#);
        let err = load(&path).unwrap_err();
        assert_eq!(err.code, ErrorCode::ManifestInvalidJson);
    }

    #[test]
    fn empty_manifest_is_rejected() {
        let (_dir, path) = write_manifest("[]");
        let err = load(&path).unwrap_err();
        assert_eq!(err.code, ErrorCode::ManifestEmpty);
    }

    #[test]
    fn empty_manifest_identifier_is_rejected() {
        let (_dir, path) = write_manifest(
            r#"[
                {"version": "1.0.0", "manifest": "AAA"},
                {"version": "1.1.0", "manifest": "  "}
            ]"#,
        );
        let err = load(&path).unwrap_err();
        assert_eq!(err.code, ErrorCode::ManifestInvalidEntry);
        assert_eq!(err.details["index"], 1);
    }
}
