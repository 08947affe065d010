//! Typed error contract for the archive pipeline.
//!
//! Every failure carries a stable dotted code, a human message, and a
//! serializable details payload so the CLI envelope can report it verbatim.
//! Manifest and configuration errors are fatal to a run; tool, workspace, and
//! publish errors are caught per version by the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingVar,
    ConfigInvalidValue,

    ManifestNotFound,
    ManifestInvalidJson,
    ManifestEmpty,
    ManifestInvalidEntry,

    ToolFetchFailed,
    ToolMissing,
    ToolExecutionFailed,

    WorkspaceIoError,

    PublishFailed,
    GitCommandFailed,

    InternalIoError,
    InternalJsonError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingVar => "config.missing_var",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ManifestNotFound => "manifest.not_found",
            ErrorCode::ManifestInvalidJson => "manifest.invalid_json",
            ErrorCode::ManifestEmpty => "manifest.empty",
            ErrorCode::ManifestInvalidEntry => "manifest.invalid_entry",

            ErrorCode::ToolFetchFailed => "tool.fetch_failed",
            ErrorCode::ToolMissing => "tool.missing",
            ErrorCode::ToolExecutionFailed => "tool.execution_failed",

            ErrorCode::WorkspaceIoError => "workspace.io_error",

            ErrorCode::PublishFailed => "publish.failed",
            ErrorCode::GitCommandFailed => "git.command_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionFailedDetails {
    pub tool: String,
    pub exit_code: i32,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishFailedDetails {
    pub stage: String,
    pub branch: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDetails {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn config_missing_var(var: impl Into<String>) -> Self {
        let var = var.into();
        let details = serde_json::json!({ "var": var });
        Self::new(
            ErrorCode::ConfigMissingVar,
            format!("Missing required environment variable: {}", var),
            details,
        )
    }

    pub fn config_invalid_value(var: impl Into<String>, problem: impl Into<String>) -> Self {
        let details = serde_json::json!({
            "var": var.into(),
            "problem": problem.into(),
        });
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn manifest_not_found(path: impl Into<String>) -> Self {
        let details = serde_json::to_value(ManifestDetails {
            path: path.into(),
            error: None,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(ErrorCode::ManifestNotFound, "Manifest file not found", details)
            .with_hint("The manifest is a JSON array of {version, manifest} records")
    }

    pub fn manifest_invalid_json(path: impl Into<String>, err: &serde_json::Error) -> Self {
        let details = serde_json::to_value(ManifestDetails {
            path: path.into(),
            error: Some(err.to_string()),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(ErrorCode::ManifestInvalidJson, "Invalid manifest JSON", details)
    }

    pub fn manifest_empty(path: impl Into<String>) -> Self {
        let details = serde_json::to_value(ManifestDetails {
            path: path.into(),
            error: None,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::ManifestEmpty,
            "Manifest contains no versions",
            details,
        )
    }

    pub fn manifest_invalid_entry(index: usize, problem: impl Into<String>) -> Self {
        let details = serde_json::json!({
            "index": index,
            "problem": problem.into(),
        });
        Self::new(
            ErrorCode::ManifestInvalidEntry,
            format!("Invalid manifest entry at index {}", index),
            details,
        )
    }

    pub fn tool_fetch_failed(tool: impl Into<String>, error: impl Into<String>) -> Self {
        let tool = tool.into();
        let details = serde_json::json!({
            "tool": tool,
            "error": error.into(),
        });
        Self::new(
            ErrorCode::ToolFetchFailed,
            format!("Failed to fetch {}", tool),
            details,
        )
    }

    pub fn tool_missing(tool: impl Into<String>, path: impl Into<String>) -> Self {
        let tool = tool.into();
        let details = serde_json::json!({
            "tool": tool,
            "path": path.into(),
        });
        Self::new(
            ErrorCode::ToolMissing,
            format!("Tool executable not found: {}", tool),
            details,
        )
    }

    pub fn tool_execution_failed(
        tool: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        let tool = tool.into();
        let details = serde_json::to_value(ToolExecutionFailedDetails {
            tool: tool.clone(),
            exit_code,
            stderr: stderr.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::ToolExecutionFailed,
            format!("{} exited with code {}", tool, exit_code),
            details,
        )
    }

    pub fn workspace_io(error: impl Into<String>, context: impl Into<String>) -> Self {
        let details = serde_json::json!({
            "error": error.into(),
            "context": context.into(),
        });
        Self::new(
            ErrorCode::WorkspaceIoError,
            "Workspace I/O failure",
            details,
        )
    }

    pub fn publish_failed(
        stage: impl Into<String>,
        branch: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let stage = stage.into();
        let details = serde_json::to_value(PublishFailedDetails {
            stage: stage.clone(),
            branch: branch.into(),
            error: error.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::PublishFailed,
            format!("Publish failed during {}", stage),
            details,
        )
    }

    pub fn git_command_failed(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::GitCommandFailed,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": error.into(),
            "context": context,
        });
        Self::new(ErrorCode::InternalIoError, "I/O error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": error.into(),
            "context": context,
        });
        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_dotted_and_stable() {
        assert_eq!(ErrorCode::ManifestInvalidJson.as_str(), "manifest.invalid_json");
        assert_eq!(ErrorCode::ToolExecutionFailed.as_str(), "tool.execution_failed");
        assert_eq!(ErrorCode::PublishFailed.as_str(), "publish.failed");
        assert_eq!(ErrorCode::WorkspaceIoError.as_str(), "workspace.io_error");
    }

    #[test]
    fn tool_execution_failed_carries_exit_code_and_stderr() {
        let err = Error::tool_execution_failed("download", 3, "boom");
        assert_eq!(err.code, ErrorCode::ToolExecutionFailed);
        assert_eq!(err.details["exitCode"], 3);
        assert_eq!(err.details["stderr"], "boom");
    }

    #[test]
    fn publish_failed_names_the_stage() {
        let err = Error::publish_failed("push", "v1.0.0", "remote hung up");
        assert_eq!(err.details["stage"], "push");
        assert_eq!(err.details["branch"], "v1.0.0");
        assert!(err.message.contains("push"));
    }

    #[test]
    fn hints_accumulate() {
        let err = Error::config_missing_var("STEAM_USERNAME")
            .with_hint("Set STEAM_USERNAME in the environment");
        assert_eq!(err.hints.len(), 1);
    }
}
