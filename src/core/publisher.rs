//! Git branch publishing.
//!
//! The publisher owns the archive repository working directory. Each version
//! is published to its own branch; branch existence on the remote is the
//! durable marker of completed work. Checkout mutates the shared working
//! tree, so publishing is strictly sequential — one version in flight at a
//! time.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use semver::Version;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::core::local_files;

const STAGE_BRANCH: &str = "branch";
const STAGE_CHECKOUT: &str = "checkout";
const STAGE_CLEAN: &str = "clean";
const STAGE_COPY: &str = "copy";
const STAGE_ADD: &str = "add";
const STAGE_COMMIT: &str = "commit";
const STAGE_PUSH: &str = "push";

/// What a publish call did to the branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A new commit was created and pushed.
    Committed { commit: String },
    /// The tree already matched, but an earlier commit was missing from the
    /// remote and has now been pushed.
    Repushed { commit: String },
    /// The tree already matched and the remote is current; nothing was done.
    Unchanged,
}

pub struct Publisher {
    repo_path: PathBuf,
    remote: String,
    branch_prefix: String,
    author_name: String,
    author_email: String,
    push_token: Option<String>,
}

impl Publisher {
    /// Open the archive repository, initializing a fresh one if the path is
    /// not a repository yet.
    pub fn open(config: &Config) -> Result<Self> {
        let publisher = Self {
            repo_path: config.repo_path.clone(),
            remote: config.remote.clone(),
            branch_prefix: config.branch_prefix.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
            push_token: config.push_token.clone(),
        };

        if !publisher.repo_path.join(".git").exists() {
            std::fs::create_dir_all(&publisher.repo_path)
                .map_err(|e| Error::internal_io(e.to_string(), Some("create repo dir".to_string())))?;
            let output = publisher
                .git(&["init"])
                .map_err(|e| Error::git_command_failed(format!("git init failed: {}", e)))?;
            if !output.status.success() {
                return Err(Error::git_command_failed(format!(
                    "git init failed: {}",
                    error_text(&output)
                )));
            }
            log_status!(
                "publisher",
                "Initialized repository at {}",
                publisher.repo_path.display()
            );
        }

        Ok(publisher)
    }

    /// Branch name for a version. Pure: the same version always maps to the
    /// same branch, within a run and across runs.
    pub fn branch_name(&self, version: &Version) -> String {
        format!("{}{}", self.branch_prefix, version)
    }

    /// Whether a version's branch already exists — the sole idempotence
    /// check.
    ///
    /// Consults the remote branch list when a remote is configured, so a
    /// commit that was created locally but never pushed does not count as
    /// published. Falls back to local branch existence otherwise. A
    /// repository with zero commits or branches yields false, never an
    /// error.
    pub fn is_published(&self, branch: &str) -> Result<bool> {
        if self.has_remote()? {
            let output = self
                .git(&["ls-remote", "--exit-code", "--heads", &self.remote, branch])
                .map_err(|e| Error::git_command_failed(format!("git ls-remote failed: {}", e)))?;
            return match output.status.code() {
                Some(0) => Ok(true),
                // --exit-code: 2 means no matching refs
                Some(2) => Ok(false),
                _ => Err(Error::git_command_failed(format!(
                    "git ls-remote failed: {}",
                    error_text(&output)
                ))),
            };
        }

        Ok(self.local_branch_exists(branch))
    }

    /// Publish a stripped artifact tree to a version's branch.
    ///
    /// The branch tree is a full replacement: everything previously tracked
    /// is dropped before the copy, so files removed by a newer strip do not
    /// linger. When the resulting tree is identical to the branch head no
    /// commit is created; an unpushed head is still pushed so an earlier
    /// interrupted run is repaired. Commit is the last durable local state
    /// change — after it, only the push can fail.
    pub fn publish(
        &self,
        version: &Version,
        branch: &str,
        stripped: &Path,
    ) -> Result<PublishOutcome> {
        if self.local_branch_exists(branch) {
            // Forced: a previous failed publish may have left the tree dirty.
            self.git_require(&["checkout", "-f", branch], STAGE_CHECKOUT, branch)?;
        } else {
            // Orphan keeps every version branch self-contained instead of
            // chaining histories across versions.
            self.git_require(&["checkout", "--orphan", branch], STAGE_BRANCH, branch)?;
        }

        local_files::clear_dir_except(&self.repo_path, &[".git"])
            .map_err(|e| Error::publish_failed(STAGE_CLEAN, branch, e.to_string()))?;

        local_files::copy_tree(stripped, &self.repo_path)
            .map_err(|e| Error::publish_failed(STAGE_COPY, branch, e.to_string()))?;

        self.git_require(&["add", "-A"], STAGE_ADD, branch)?;

        if self.workdir_clean(branch)? {
            if self.needs_push(branch)? {
                let commit = self.head_commit(branch)?;
                self.push(branch)?;
                return Ok(PublishOutcome::Repushed { commit });
            }
            return Ok(PublishOutcome::Unchanged);
        }

        let message = format!("chore: strip v{}", version);
        let author_name = format!("user.name={}", self.author_name);
        let author_email = format!("user.email={}", self.author_email);
        self.git_require(
            &[
                "-c",
                &author_name,
                "-c",
                &author_email,
                "commit",
                "-m",
                &message,
            ],
            STAGE_COMMIT,
            branch,
        )?;

        let commit = self.head_commit(branch)?;
        self.push(branch)?;
        Ok(PublishOutcome::Committed { commit })
    }

    fn git(&self, args: &[&str]) -> std::io::Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
    }

    /// Run git, mapping both spawn failure and non-zero exit into a publish
    /// failure attributed to `stage`.
    fn git_require(&self, args: &[&str], stage: &str, branch: &str) -> Result<()> {
        let output = self
            .git(args)
            .map_err(|e| Error::publish_failed(stage, branch, e.to_string()))?;
        if !output.status.success() {
            return Err(Error::publish_failed(stage, branch, error_text(&output)));
        }
        Ok(())
    }

    fn git_ok(&self, args: &[&str]) -> bool {
        self.git(args).map(|o| o.status.success()).unwrap_or(false)
    }

    fn local_branch_exists(&self, branch: &str) -> bool {
        let reference = format!("refs/heads/{}", branch);
        self.git_ok(&["show-ref", "--verify", "--quiet", &reference])
    }

    fn has_remote(&self) -> Result<bool> {
        let output = self
            .git(&["remote"])
            .map_err(|e| Error::git_command_failed(format!("git remote failed: {}", e)))?;
        if !output.status.success() {
            return Err(Error::git_command_failed(format!(
                "git remote failed: {}",
                error_text(&output)
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().any(|r| r.trim() == self.remote))
    }

    /// After `add -A`, an empty porcelain status means the staged tree equals
    /// the branch head.
    fn workdir_clean(&self, branch: &str) -> Result<bool> {
        let output = self
            .git(&["status", "--porcelain"])
            .map_err(|e| Error::publish_failed(STAGE_ADD, branch, e.to_string()))?;
        if !output.status.success() {
            return Err(Error::publish_failed(STAGE_ADD, branch, error_text(&output)));
        }
        Ok(output.stdout.is_empty())
    }

    /// Whether the local branch head differs from (or is absent on) the
    /// remote. False when no remote is configured or the branch has no
    /// commits yet.
    fn needs_push(&self, branch: &str) -> Result<bool> {
        if !self.has_remote()? {
            return Ok(false);
        }

        let reference = format!("refs/heads/{}", branch);
        let local = match self.git(&["rev-parse", "--verify", &reference]) {
            Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout).trim().to_string(),
            _ => return Ok(false),
        };

        let output = self
            .git(&["ls-remote", "--heads", &self.remote, branch])
            .map_err(|e| Error::git_command_failed(format!("git ls-remote failed: {}", e)))?;
        if !output.status.success() {
            return Err(Error::git_command_failed(format!(
                "git ls-remote failed: {}",
                error_text(&output)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let remote_hash = stdout.split_whitespace().next();
        Ok(remote_hash != Some(local.as_str()))
    }

    fn head_commit(&self, branch: &str) -> Result<String> {
        let output = self
            .git(&["rev-parse", "HEAD"])
            .map_err(|e| Error::publish_failed(STAGE_COMMIT, branch, e.to_string()))?;
        if !output.status.success() {
            return Err(Error::publish_failed(
                STAGE_COMMIT,
                branch,
                error_text(&output),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Push the branch to the configured remote. The refspec is forced so a
    /// re-publish replaces the remote branch; no push happens when no remote
    /// is configured. Not retried — re-running the pipeline is the retry
    /// mechanism.
    fn push(&self, branch: &str) -> Result<()> {
        if !self
            .has_remote()
            .map_err(|e| Error::publish_failed(STAGE_PUSH, branch, e.to_string()))?
        {
            log_status!("publisher", "No remote {}, skipping push", self.remote);
            return Ok(());
        }

        let refspec = format!("+{}", branch);
        let mut command = Command::new("git");
        command.current_dir(&self.repo_path);
        if let Some(token) = &self.push_token {
            command.arg("-c").arg(format!(
                "credential.helper=!f() {{ echo username=git; echo password={}; }}; f",
                token
            ));
        }
        command
            .args(["push", "-u", self.remote.as_str(), refspec.as_str()])
            .env("GIT_TERMINAL_PROMPT", "0");

        let output = command
            .output()
            .map_err(|e| Error::publish_failed(STAGE_PUSH, branch, e.to_string()))?;
        if !output.status.success() {
            return Err(Error::publish_failed(
                STAGE_PUSH,
                branch,
                error_text(&output),
            ));
        }

        log_status!("publisher", "Pushed {} to {}", branch, self.remote);
        Ok(())
    }
}

/// Extract error text from command output, preferring stderr.
fn error_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        stderr.trim().to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_publisher(repo: &Path) -> Publisher {
        Publisher {
            repo_path: repo.to_path_buf(),
            remote: "origin".to_string(),
            branch_prefix: "v".to_string(),
            author_name: "Archive Bot".to_string(),
            author_email: "bot@example.com".to_string(),
            push_token: None,
        }
    }

    fn version(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn branch_name_is_deterministic() {
        let dir = tempdir().unwrap();
        let publisher = test_publisher(dir.path());
        assert_eq!(publisher.branch_name(&version("1.0.0")), "v1.0.0");
        assert_eq!(
            publisher.branch_name(&version("1.0.0")),
            publisher.branch_name(&version("1.0.0"))
        );
        assert_ne!(
            publisher.branch_name(&version("1.0.0")),
            publisher.branch_name(&version("1.0.1"))
        );
    }

    #[test]
    fn branch_prefix_is_respected() {
        let dir = tempdir().unwrap();
        let mut publisher = test_publisher(dir.path());
        publisher.branch_prefix = "version/".to_string();
        assert_eq!(publisher.branch_name(&version("1.2.3")), "version/1.2.3");
    }

    #[test]
    fn empty_repository_reports_nothing_published() {
        let dir = tempdir().unwrap();
        let publisher = test_publisher(dir.path());
        let output = publisher.git(&["init"]).unwrap();
        assert!(output.status.success());
        // Zero commits, zero branches: false, not an error.
        assert!(!publisher.is_published("v1.0.0").unwrap());
    }

    #[test]
    fn publish_to_fresh_repository_creates_branch_and_commit() {
        let repo = tempdir().unwrap();
        let tree = tempdir().unwrap();
        std::fs::write(tree.path().join("game.dll"), "payload").unwrap();

        let publisher = test_publisher(repo.path());
        publisher.git(&["init"]).unwrap();

        let outcome = publisher
            .publish(&version("1.0.0"), "v1.0.0", tree.path())
            .unwrap();
        assert!(matches!(outcome, PublishOutcome::Committed { .. }));
        assert!(publisher.local_branch_exists("v1.0.0"));
        assert!(!publisher.is_published("v2.0.0").unwrap());

        let log = publisher.git(&["log", "-1", "--format=%s"]).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&log.stdout).trim(),
            "chore: strip v1.0.0"
        );
    }

    #[test]
    fn identical_republish_creates_no_commit() {
        let repo = tempdir().unwrap();
        let tree = tempdir().unwrap();
        std::fs::write(tree.path().join("game.dll"), "payload").unwrap();

        let publisher = test_publisher(repo.path());
        publisher.git(&["init"]).unwrap();

        publisher
            .publish(&version("1.0.0"), "v1.0.0", tree.path())
            .unwrap();
        let outcome = publisher
            .publish(&version("1.0.0"), "v1.0.0", tree.path())
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Unchanged);

        let count = publisher
            .git(&["rev-list", "--count", "v1.0.0"])
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&count.stdout).trim(), "1");
    }

    #[test]
    fn republish_replaces_stale_files() {
        let repo = tempdir().unwrap();
        let publisher = test_publisher(repo.path());
        publisher.git(&["init"]).unwrap();

        let old_tree = tempdir().unwrap();
        std::fs::write(old_tree.path().join("old.dll"), "old").unwrap();
        std::fs::write(old_tree.path().join("game.dll"), "v1").unwrap();
        publisher
            .publish(&version("1.0.0"), "v1.0.0", old_tree.path())
            .unwrap();

        let new_tree = tempdir().unwrap();
        std::fs::write(new_tree.path().join("game.dll"), "v2").unwrap();
        publisher
            .publish(&version("1.0.0"), "v1.0.0", new_tree.path())
            .unwrap();

        // Full replacement: the dropped file must not linger on the branch.
        let ls = publisher.git(&["ls-tree", "--name-only", "v1.0.0"]).unwrap();
        let names = String::from_utf8_lossy(&ls.stdout);
        assert!(names.contains("game.dll"));
        assert!(!names.contains("old.dll"));
    }

    #[test]
    fn version_branches_are_self_contained() {
        let repo = tempdir().unwrap();
        let publisher = test_publisher(repo.path());
        publisher.git(&["init"]).unwrap();

        let tree_a = tempdir().unwrap();
        std::fs::write(tree_a.path().join("a.dll"), "a").unwrap();
        publisher
            .publish(&version("1.0.0"), "v1.0.0", tree_a.path())
            .unwrap();

        let tree_b = tempdir().unwrap();
        std::fs::write(tree_b.path().join("b.dll"), "b").unwrap();
        publisher
            .publish(&version("2.0.0"), "v2.0.0", tree_b.path())
            .unwrap();

        // Each branch carries exactly one commit; histories are not chained.
        for branch in ["v1.0.0", "v2.0.0"] {
            let count = publisher.git(&["rev-list", "--count", branch]).unwrap();
            assert_eq!(String::from_utf8_lossy(&count.stdout).trim(), "1");
        }
    }
}
