//! On-demand acquisition of the helper tools.
//!
//! The pipeline shells out to two external executables: the depot download
//! tool and the generic strip tool. Both are fetched from their GitHub
//! latest-release zip assets into a local bin directory the first time they
//! are needed. Explicit path overrides in the configuration skip acquisition
//! entirely.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::Config;
use crate::error::{Error, Result};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const DOWNLOADER_RELEASES_API: &str =
    "https://api.github.com/repos/SteamRE/DepotDownloader/releases/latest";
const STRIPPER_RELEASES_API: &str =
    "https://api.github.com/repos/beat-forge/GenericStripper/releases/latest";

const DOWNLOADER_NAME: &str = "DepotDownloader";
const STRIPPER_NAME: &str = "GenericStripper";

#[derive(Deserialize)]
struct GitHubRelease {
    assets: Vec<GitHubAsset>,
}

#[derive(Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
}

/// Resolved executable paths for the two helper tools.
pub struct ToolPaths {
    pub downloader: PathBuf,
    pub stripper: PathBuf,
}

/// Resolve both tools, fetching whichever is not installed yet.
pub fn ensure(config: &Config) -> Result<ToolPaths> {
    let downloader = match &config.downloader_path {
        Some(path) => verify_override("download", path)?,
        None => ensure_tool(&config.bin_dir, DOWNLOADER_NAME, DOWNLOADER_RELEASES_API)?,
    };

    let stripper = match &config.stripper_path {
        Some(path) => verify_override("strip", path)?,
        None => ensure_tool(&config.bin_dir, STRIPPER_NAME, STRIPPER_RELEASES_API)?,
    };

    Ok(ToolPaths {
        downloader,
        stripper,
    })
}

fn verify_override(label: &str, path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(Error::tool_missing(label, path.to_string_lossy()));
    }
    Ok(path.to_path_buf())
}

fn ensure_tool(bin_dir: &Path, name: &str, api_url: &str) -> Result<PathBuf> {
    let install_dir = bin_dir.join(name);
    let exe = install_dir.join(exe_name(name));

    if !exe.is_file() {
        fetch_and_extract(name, api_url, &install_dir)?;
    }

    if !exe.is_file() {
        return Err(
            Error::tool_missing(name, exe.to_string_lossy()).with_hint(format!(
                "Point SHELVER_{}_PATH at an existing executable to skip acquisition",
                if name == DOWNLOADER_NAME { "DOWNLOADER" } else { "STRIPPER" }
            )),
        );
    }

    Ok(exe)
}

fn exe_name(base: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", base)
    } else {
        base.to_string()
    }
}

fn fetch_and_extract(name: &str, api_url: &str, install_dir: &Path) -> Result<()> {
    log_status!("toolchain", "Fetching latest {} release", name);

    let client = reqwest::blocking::Client::builder()
        .user_agent(format!("shelver/{}", VERSION))
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .map_err(|e| Error::tool_fetch_failed(name, e.to_string()))?;

    let release: GitHubRelease = client
        .get(api_url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::tool_fetch_failed(name, e.to_string()))?
        .json()
        .map_err(|e| Error::tool_fetch_failed(name, e.to_string()))?;

    let asset = pick_zip_asset(&release.assets).ok_or_else(|| {
        Error::tool_fetch_failed(name, "no zip asset in latest release".to_string())
    })?;

    let bytes = client
        .get(&asset.browser_download_url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::tool_fetch_failed(name, e.to_string()))?
        .bytes()
        .map_err(|e| Error::tool_fetch_failed(name, e.to_string()))?;

    std::fs::create_dir_all(install_dir)
        .map_err(|e| Error::tool_fetch_failed(name, e.to_string()))?;
    extract_zip(&bytes, install_dir).map_err(|e| Error::tool_fetch_failed(name, e.to_string()))?;

    log_status!("toolchain", "Extracted {} to {}", name, install_dir.display());
    Ok(())
}

/// Prefer an asset built for this platform; fall back to the first zip.
fn pick_zip_asset(assets: &[GitHubAsset]) -> Option<&GitHubAsset> {
    let platform = if cfg!(windows) {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else {
        "linux"
    };

    assets
        .iter()
        .find(|a| a.name.ends_with(".zip") && a.name.contains(platform))
        .or_else(|| assets.iter().find(|a| a.name.ends_with(".zip")))
}

fn extract_zip(bytes: &[u8], target_dir: &Path) -> std::io::Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let outpath = target_dir.join(file.mangled_name());

        if file.name().ends_with('/') {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = std::fs::File::create(&outpath)?;
        std::io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn asset(name: &str) -> GitHubAsset {
        GitHubAsset {
            name: name.to_string(),
            browser_download_url: format!("https://example.com/{}", name),
        }
    }

    #[test]
    fn prefers_platform_zip_over_first_zip() {
        let assets = vec![
            asset("DepotDownloader-windows-x64.zip"),
            asset("DepotDownloader-linux-x64.zip"),
            asset("DepotDownloader-macos-x64.zip"),
        ];
        let picked = pick_zip_asset(&assets).unwrap();
        let platform = if cfg!(windows) {
            "windows"
        } else if cfg!(target_os = "macos") {
            "macos"
        } else {
            "linux"
        };
        assert!(picked.name.contains(platform));
    }

    #[test]
    fn falls_back_to_any_zip() {
        let assets = vec![asset("checksums.txt"), asset("GenericStripper.zip")];
        assert_eq!(
            pick_zip_asset(&assets).unwrap().name,
            "GenericStripper.zip"
        );
    }

    #[test]
    fn no_zip_asset_yields_none() {
        let assets = vec![asset("checksums.txt")];
        assert!(pick_zip_asset(&assets).is_none());
    }

    #[test]
    fn extract_zip_writes_nested_entries() {
        let mut raw = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut raw));
            let options = zip::write::FileOptions::default();
            writer.start_file("tool/data.txt", options).unwrap();
            writer.write_all(b"contents").unwrap();
            writer.finish().unwrap();
        }

        let dir = tempdir().unwrap();
        extract_zip(&raw, dir.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("tool/data.txt")).unwrap(),
            "contents"
        );
    }

    #[test]
    fn override_must_exist() {
        let dir = tempdir().unwrap();
        let err = verify_override("download", &dir.path().join("missing")).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ToolMissing);
    }
}
