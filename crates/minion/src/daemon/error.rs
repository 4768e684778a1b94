//! Errors returned by the service registry, command runner and lifecycle manager.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::daemon::runner::ToolStep;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service already exists: {0}")]
    AlreadyExists(String),

    #[error("Service not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to encode parameters: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Command '{command}' failed for {id} (exit code {}): {output}", display_code(.code))]
    Subprocess {
        id: String,
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("{step} step failed (exit code {}): {output}", display_code(.code))]
    ExternalTool {
        step: ToolStep,
        code: Option<i32>,
        output: String,
    },

    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse stats output: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{what} timed out after {}s", .after.as_secs())]
    Timeout { what: String, after: Duration },
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Coarse error classification exposed to RPC clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    InvalidInput,
    SerializationFailure,
    SubprocessFailure,
    ExternalToolFailure,
    FilesystemFailure,
    ParseFailure,
    SpawnFailure,
    Timeout,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServiceError::Serialization(_) => ErrorKind::SerializationFailure,
            ServiceError::Subprocess { .. } => ErrorKind::SubprocessFailure,
            ServiceError::ExternalTool { .. } => ErrorKind::ExternalToolFailure,
            ServiceError::Filesystem { .. } => ErrorKind::FilesystemFailure,
            ServiceError::Parse(_) => ErrorKind::ParseFailure,
            ServiceError::Spawn { .. } => ErrorKind::SpawnFailure,
            ServiceError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Captured subprocess output, for the kinds that carry one.
    pub fn output(&self) -> Option<&str> {
        match self {
            ServiceError::Subprocess { output, .. } | ServiceError::ExternalTool { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ServiceError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServiceError::NotFound("echo".to_string());
        assert_eq!(err.to_string(), "Service not found: echo");

        let err = ServiceError::Subprocess {
            id: "echo".to_string(),
            command: "stop".to_string(),
            code: Some(2),
            output: "not running".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command 'stop' failed for echo (exit code 2): not running"
        );
    }

    #[test]
    fn test_subprocess_killed_by_signal_display() {
        let err = ServiceError::ExternalTool {
            step: ToolStep::Build,
            code: None,
            output: String::new(),
        };
        assert!(err.to_string().contains("exit code signal"));
    }

    #[test]
    fn test_output_only_for_process_failures() {
        let err = ServiceError::ExternalTool {
            step: ToolStep::Fetch,
            code: Some(1),
            output: "cannot find package".to_string(),
        };
        assert_eq!(err.output(), Some("cannot find package"));
        assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
        assert!(ServiceError::AlreadyExists("x".into()).output().is_none());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SubprocessFailure).unwrap();
        assert_eq!(json, "\"subprocess_failure\"");
    }
}
