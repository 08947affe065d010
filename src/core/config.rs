//! Runtime configuration, resolved once at startup.
//!
//! All environment access happens here. Components receive the resolved
//! struct, so credentials and paths can be faked in tests without touching
//! process state.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const DEFAULT_REPO_PATH: &str = "./versions";
const DEFAULT_BIN_DIR: &str = "./bin";
const DEFAULT_BRANCH_PREFIX: &str = "v";
const DEFAULT_REMOTE: &str = "origin";

// Steam app/depot of the archived application, and the stripper module that
// knows how to reduce it. Overridable for other deployments of the pipeline.
const DEFAULT_APP_ID: &str = "620980";
const DEFAULT_DEPOT_ID: &str = "620981";
const DEFAULT_STRIP_MODULE: &str = "beatsaber";

const MANIFEST_FILENAME: &str = "versions.json";

#[derive(Debug, Clone)]
pub struct Config {
    /// Archive repository working directory.
    pub repo_path: PathBuf,
    /// Explicit manifest path; defaults to `versions.json` inside the repo.
    pub manifest_override: Option<PathBuf>,
    /// Parent directory for per-version workspaces.
    pub work_dir: PathBuf,
    /// Install directory for fetched helper tools.
    pub bin_dir: PathBuf,
    pub remote: String,
    pub branch_prefix: String,
    pub author_name: String,
    pub author_email: String,
    /// Push credential; pushes fall back to ambient git auth when unset.
    pub push_token: Option<String>,
    pub steam_username: String,
    pub steam_password: String,
    pub app_id: String,
    pub depot_id: String,
    pub strip_module: String,
    /// Pre-installed download tool; skips acquisition when set.
    pub downloader_path: Option<PathBuf>,
    /// Pre-installed strip tool; skips acquisition when set.
    pub stripper_path: Option<PathBuf>,
}

impl Config {
    /// Build the configuration from the process environment.
    ///
    /// Missing credentials or author identity abort the run before any
    /// version is touched.
    pub fn from_env() -> Result<Self> {
        let steam_username = require("STEAM_USERNAME")?;
        let steam_password = require("STEAM_PASSWORD")?;
        let author_name = require("GIT_AUTHOR_NAME")
            .map_err(|e| e.with_hint("Set GIT_AUTHOR_NAME to the identity used for archive commits"))?;
        let author_email = require("GIT_AUTHOR_EMAIL")
            .map_err(|e| e.with_hint("Set GIT_AUTHOR_EMAIL to the identity used for archive commits"))?;

        Ok(Self {
            repo_path: expand_path(&var_or("REPO_PATH", DEFAULT_REPO_PATH)),
            manifest_override: optional("SHELVER_MANIFEST_PATH").map(|v| expand_path(&v)),
            work_dir: optional("SHELVER_WORK_DIR")
                .map(|v| expand_path(&v))
                .unwrap_or_else(std::env::temp_dir),
            bin_dir: expand_path(&var_or("SHELVER_BIN_DIR", DEFAULT_BIN_DIR)),
            remote: var_or("SHELVER_REMOTE", DEFAULT_REMOTE),
            branch_prefix: var_or("SHELVER_BRANCH_PREFIX", DEFAULT_BRANCH_PREFIX),
            author_name,
            author_email,
            push_token: optional("GITHUB_TOKEN"),
            steam_username,
            steam_password,
            app_id: var_or("SHELVER_APP_ID", DEFAULT_APP_ID),
            depot_id: var_or("SHELVER_DEPOT_ID", DEFAULT_DEPOT_ID),
            strip_module: var_or("SHELVER_STRIP_MODULE", DEFAULT_STRIP_MODULE),
            downloader_path: optional("SHELVER_DOWNLOADER_PATH").map(|v| expand_path(&v)),
            stripper_path: optional("SHELVER_STRIPPER_PATH").map(|v| expand_path(&v)),
        })
    }

    /// Effective manifest path: the override if given, otherwise
    /// `versions.json` inside the archive repository.
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest_override
            .clone()
            .unwrap_or_else(|| self.repo_path.join(MANIFEST_FILENAME))
    }

    /// Apply command-line path overrides on top of the environment.
    pub fn apply_overrides(&mut self, repo: Option<&Path>, manifest: Option<&Path>) {
        if let Some(repo) = repo {
            self.repo_path = repo.to_path_buf();
        }
        if let Some(manifest) = manifest {
            self.manifest_override = Some(manifest.to_path_buf());
        }
    }
}

fn require(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::config_missing_var(name)),
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    optional(name).unwrap_or_else(|| default.to_string())
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            repo_path: PathBuf::from("./versions"),
            manifest_override: None,
            work_dir: std::env::temp_dir(),
            bin_dir: PathBuf::from("./bin"),
            remote: DEFAULT_REMOTE.to_string(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            author_name: "Archive Bot".to_string(),
            author_email: "bot@example.com".to_string(),
            push_token: None,
            steam_username: "user".to_string(),
            steam_password: "pass".to_string(),
            app_id: DEFAULT_APP_ID.to_string(),
            depot_id: DEFAULT_DEPOT_ID.to_string(),
            strip_module: DEFAULT_STRIP_MODULE.to_string(),
            downloader_path: None,
            stripper_path: None,
        }
    }

    #[test]
    fn manifest_path_defaults_into_repo() {
        let config = test_config();
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("./versions").join("versions.json")
        );
    }

    #[test]
    fn manifest_override_wins() {
        let mut config = test_config();
        config.manifest_override = Some(PathBuf::from("/data/manifest.json"));
        assert_eq!(config.manifest_path(), PathBuf::from("/data/manifest.json"));
    }

    #[test]
    fn cli_overrides_replace_env_paths() {
        let mut config = test_config();
        config.apply_overrides(
            Some(Path::new("/srv/archive")),
            Some(Path::new("/srv/manifest.json")),
        );
        assert_eq!(config.repo_path, PathBuf::from("/srv/archive"));
        assert_eq!(config.manifest_path(), PathBuf::from("/srv/manifest.json"));
    }

    #[test]
    fn tilde_paths_are_expanded() {
        let expanded = expand_path("~/archive");
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
