//! Per-version processing loop.
//!
//! Versions are processed strictly in manifest order, one at a time: the
//! publisher's working tree is a shared mutable resource, so nothing here may
//! overlap two versions. A failing version is recorded and the loop moves on
//! — one version can never abort the batch. There are no retries; re-running
//! the pipeline is the retry mechanism, made safe by the publisher's
//! idempotence check.

use std::path::Path;

use semver::Version;
use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::manifest::VersionEntry;
use crate::publisher::{PublishOutcome, Publisher};
use crate::runner;
use crate::toolchain::ToolPaths;
use crate::workspace::Workspace;

const VERSION_SENTINEL: &str = "version.txt";

const STATUS_PUBLISHED: &str = "published";
const STATUS_UNCHANGED: &str = "unchanged";
const STATUS_SKIPPED: &str = "skipped";
const STATUS_FAILED: &str = "failed";

/// Outcome row for a single manifest entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionOutcome {
    pub version: String,
    pub branch: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VersionOutcome {
    fn new(version: &Version, branch: &str) -> Self {
        Self {
            version: version.to_string(),
            branch: branch.to_string(),
            status: String::new(),
            commit: None,
            error: None,
        }
    }

    fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    fn with_commit(mut self, commit: String) -> Self {
        self.commit = Some(commit);
        self
    }

    fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub total: usize,
    pub published: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of processing every manifest entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub results: Vec<VersionOutcome>,
    pub summary: PipelineSummary,
}

/// Process every manifest entry in order.
///
/// Fatal errors (bad manifest, bad config) have already been surfaced by the
/// time this runs; everything that can fail here is scoped to one version, so
/// the function itself never errors.
pub fn run(
    config: &Config,
    publisher: &Publisher,
    tools: &ToolPaths,
    entries: &[VersionEntry],
    force: bool,
) -> PipelineResult {
    let mut results: Vec<VersionOutcome> = Vec::with_capacity(entries.len());
    let mut published: usize = 0;
    let mut unchanged: usize = 0;
    let mut skipped: usize = 0;
    let mut failed: usize = 0;

    for entry in entries {
        let branch = publisher.branch_name(&entry.version);
        let outcome = VersionOutcome::new(&entry.version, &branch);

        if !force {
            match publisher.is_published(&branch) {
                Ok(true) => {
                    log_status!(
                        "pipeline",
                        "Skipping {} ({} already published)",
                        entry.version,
                        branch
                    );
                    results.push(outcome.with_status(STATUS_SKIPPED));
                    skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    log_status!("pipeline", "Version {} failed: {}", entry.version, err);
                    results.push(outcome.with_status(STATUS_FAILED).with_error(err.to_string()));
                    failed += 1;
                    continue;
                }
            }
        }

        log_status!("pipeline", "Processing version {}", entry.version);
        match process_version(config, publisher, tools, entry, &branch) {
            Ok(PublishOutcome::Committed { commit })
            | Ok(PublishOutcome::Repushed { commit }) => {
                results.push(outcome.with_status(STATUS_PUBLISHED).with_commit(commit));
                published += 1;
            }
            Ok(PublishOutcome::Unchanged) => {
                results.push(outcome.with_status(STATUS_UNCHANGED));
                unchanged += 1;
            }
            Err(err) => {
                log_status!("pipeline", "Version {} failed: {}", entry.version, err);
                results.push(outcome.with_status(STATUS_FAILED).with_error(err.to_string()));
                failed += 1;
            }
        }
    }

    PipelineResult {
        summary: PipelineSummary {
            total: results.len(),
            published,
            unchanged,
            skipped,
            failed,
        },
        results,
    }
}

/// Download, strip, and publish one version inside a scoped workspace.
fn process_version(
    config: &Config,
    publisher: &Publisher,
    tools: &ToolPaths,
    entry: &VersionEntry,
    branch: &str,
) -> Result<PublishOutcome> {
    let workspace = Workspace::create(&config.work_dir)?;

    let result = run_steps(config, publisher, tools, entry, branch, &workspace);

    // Disposal is unconditional: explicit on success so a deletion failure is
    // surfaced, implicit via Drop on the error path.
    match result {
        Ok(outcome) => {
            workspace.dispose()?;
            Ok(outcome)
        }
        Err(err) => Err(err),
    }
}

fn run_steps(
    config: &Config,
    publisher: &Publisher,
    tools: &ToolPaths,
    entry: &VersionEntry,
    branch: &str,
    workspace: &Workspace,
) -> Result<PublishOutcome> {
    runner::run_tool(
        "download",
        &tools.downloader,
        &download_args(config, entry, workspace.download()),
    )?;

    runner::run_tool(
        "strip",
        &tools.stripper,
        &strip_args(config, workspace.download(), workspace.stripped()),
    )?;

    write_version_sentinel(workspace.stripped(), &entry.version)?;

    publisher.publish(&entry.version, branch, workspace.stripped())
}

fn download_args(config: &Config, entry: &VersionEntry, download_dir: &Path) -> Vec<String> {
    vec![
        "-app".to_string(),
        config.app_id.clone(),
        "-depot".to_string(),
        config.depot_id.clone(),
        "-manifest".to_string(),
        entry.manifest.clone(),
        "-dir".to_string(),
        download_dir.to_string_lossy().into_owned(),
        "-remember-password".to_string(),
        "-username".to_string(),
        config.steam_username.clone(),
        "-password".to_string(),
        config.steam_password.clone(),
    ]
}

fn strip_args(config: &Config, download_dir: &Path, stripped_dir: &Path) -> Vec<String> {
    vec![
        "strip".to_string(),
        "-m".to_string(),
        config.strip_module.clone(),
        "-p".to_string(),
        download_dir.to_string_lossy().into_owned(),
        "-o".to_string(),
        stripped_dir.to_string_lossy().into_owned(),
    ]
}

/// Record the version string inside the stripped tree so every published
/// branch identifies itself.
fn write_version_sentinel(stripped_dir: &Path, version: &Version) -> Result<()> {
    let path = stripped_dir.join(VERSION_SENTINEL);
    std::fs::write(&path, format!("{}\n", version))
        .map_err(|e| Error::workspace_io(e.to_string(), "write version sentinel"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config() -> Config {
        Config {
            repo_path: "./versions".into(),
            manifest_override: None,
            work_dir: std::env::temp_dir(),
            bin_dir: "./bin".into(),
            remote: "origin".to_string(),
            branch_prefix: "v".to_string(),
            author_name: "Archive Bot".to_string(),
            author_email: "bot@example.com".to_string(),
            push_token: None,
            steam_username: "steamuser".to_string(),
            steam_password: "hunter2".to_string(),
            app_id: "620980".to_string(),
            depot_id: "620981".to_string(),
            strip_module: "beatsaber".to_string(),
            downloader_path: None,
            stripper_path: None,
        }
    }

    fn entry(version: &str, manifest: &str) -> VersionEntry {
        VersionEntry {
            version: Version::parse(version).unwrap(),
            manifest: manifest.to_string(),
        }
    }

    #[test]
    fn download_args_follow_tool_contract() {
        let config = test_config();
        let args = download_args(
            &config,
            &entry("1.0.0", "8108240436680306692"),
            Path::new("/tmp/ws/download"),
        );
        assert_eq!(
            args,
            vec![
                "-app",
                "620980",
                "-depot",
                "620981",
                "-manifest",
                "8108240436680306692",
                "-dir",
                "/tmp/ws/download",
                "-remember-password",
                "-username",
                "steamuser",
                "-password",
                "hunter2",
            ]
        );
    }

    #[test]
    fn strip_args_follow_tool_contract() {
        let config = test_config();
        let args = strip_args(
            &config,
            Path::new("/tmp/ws/download"),
            Path::new("/tmp/ws/stripped"),
        );
        assert_eq!(
            args,
            vec![
                "strip",
                "-m",
                "beatsaber",
                "-p",
                "/tmp/ws/download",
                "-o",
                "/tmp/ws/stripped",
            ]
        );
    }

    #[test]
    fn sentinel_is_newline_terminated() {
        let dir = tempdir().unwrap();
        write_version_sentinel(dir.path(), &Version::parse("1.29.1").unwrap()).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("version.txt")).unwrap(),
            "1.29.1\n"
        );
    }
}
