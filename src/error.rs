use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Closed set of error tags reported to callers. Callers branch on the tag,
/// the accompanying detail string is for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotInitialized,
    NotADirectory,
    ToolMissing,
    ToolFailed,
    Timeout,
    Cancelled,
    ReportMissing,
    ParseFailed,
    MalformedReport,
    VersionControl,
    NoRemote,
    UnparsableRemote,
    Validation,
    MissingCredentials,
    Upstream,
    Io,
}

#[derive(Error, Debug)]
pub enum PilotError {
    #[error("Source directory not set. Run initialize first.")]
    NotInitialized,

    #[error("Directory not found: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("{program} not found: {source}")]
    ToolMissing {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {detail}")]
    ToolFailed {
        program: String,
        status: String,
        detail: String,
    },

    #[error("{program} did not finish within {}s", .after.as_secs())]
    Timeout { program: String, after: Duration },

    #[error("{0} was cancelled")]
    Cancelled(String),

    #[error("Report not found: {}", .0.display())]
    ReportMissing(PathBuf),

    #[error("Failed to parse parser output: {0}")]
    Parse(String),

    #[error("Malformed coverage report: {0}")]
    MalformedReport(String),

    #[error("git: {0}")]
    Git(String),

    #[error("No remote git found")]
    NoRemote,

    #[error("Could not parse remote URL: {0}")]
    UnparsableRemote(String),

    #[error("{0}")]
    Validation(String),

    #[error("Missing {0} env variable")]
    MissingCredentials(String),

    #[error("GitHub API error: {0}")]
    Upstream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PilotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PilotError::NotInitialized => ErrorKind::NotInitialized,
            PilotError::NotADirectory(_) => ErrorKind::NotADirectory,
            PilotError::ToolMissing { .. } => ErrorKind::ToolMissing,
            PilotError::ToolFailed { .. } => ErrorKind::ToolFailed,
            PilotError::Timeout { .. } => ErrorKind::Timeout,
            PilotError::Cancelled(_) => ErrorKind::Cancelled,
            PilotError::ReportMissing(_) => ErrorKind::ReportMissing,
            PilotError::Parse(_) => ErrorKind::ParseFailed,
            PilotError::MalformedReport(_) => ErrorKind::MalformedReport,
            PilotError::Git(_) => ErrorKind::VersionControl,
            PilotError::NoRemote => ErrorKind::NoRemote,
            PilotError::UnparsableRemote(_) => ErrorKind::UnparsableRemote,
            PilotError::Validation(_) => ErrorKind::Validation,
            PilotError::MissingCredentials(_) => ErrorKind::MissingCredentials,
            PilotError::Upstream(_) => ErrorKind::Upstream,
            PilotError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, PilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_as_snake_case_tag() {
        let tag = serde_json::to_string(&PilotError::NoRemote.kind()).unwrap();
        assert_eq!(tag, "\"no_remote\"");
        let tag = serde_json::to_string(&PilotError::Git("x".into()).kind()).unwrap();
        assert_eq!(tag, "\"version_control\"");
    }

    #[test]
    fn tool_failed_message_carries_detail() {
        let err = PilotError::ToolFailed {
            program: "mvn".to_string(),
            status: "exit status: 1".to_string(),
            detail: "BUILD FAILURE".to_string(),
        };
        assert_eq!(err.to_string(), "mvn exited with exit status: 1: BUILD FAILURE");
        assert_eq!(err.kind(), ErrorKind::ToolFailed);
    }
}
