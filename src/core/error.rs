/// Error taxonomy for dump/restore operations

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperationError {
    /// Bad input detected before anything runs
    #[error("{0}")]
    Validation(String),

    /// Input is well-formed but the world is not ready for it
    #[error("{0}")]
    Precondition(String),

    /// The tool ran and exited non-zero
    #[error("{message}")]
    Execution {
        message: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The container runtime (or another executor dependency) is unreachable
    #[error("Infrastructure not accessible: {0}")]
    Infrastructure(String),

    #[error("{0}")]
    Unsupported(String),

    /// Another operation already holds this configuration
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{what} timed out after {}", format_timeout(.after))]
    Timeout { what: String, after: Duration },

    #[error("No writable location for the dump; tried: {}", format_attempts(.attempts))]
    NoWritableLocation { attempts: Vec<(PathBuf, String)> },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn format_timeout(after: &Duration) -> String {
    humantime::format_duration(*after).to_string()
}

fn format_attempts(attempts: &[(PathBuf, String)]) -> String {
    attempts
        .iter()
        .map(|(path, reason)| format!("{} ({})", path.display(), reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Coarse classification used by the HTTP layer and the CLI exit path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Precondition,
    Execution,
    Infrastructure,
    Unsupported,
    Conflict,
    NotFound,
}

impl OperationError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        OperationError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OperationError::Validation(_) => ErrorKind::Validation,
            OperationError::Precondition(_) => ErrorKind::Precondition,
            OperationError::Infrastructure(_) => ErrorKind::Infrastructure,
            OperationError::Unsupported(_) => ErrorKind::Unsupported,
            OperationError::Conflict(_) => ErrorKind::Conflict,
            OperationError::NotFound(_) => ErrorKind::NotFound,
            OperationError::Execution { .. }
            | OperationError::Timeout { .. }
            | OperationError::NoWritableLocation { .. }
            | OperationError::Io { .. } => ErrorKind::Execution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = OperationError::Timeout {
            what: "pg_dump".into(),
            after: Duration::from_secs(300),
        };
        assert_eq!(err.to_string(), "pg_dump timed out after 5m");

        let err = OperationError::NoWritableLocation {
            attempts: vec![
                (PathBuf::from("/a/x.sql"), "permission denied".into()),
                (PathBuf::from("/tmp/x.sql"), "read-only".into()),
            ],
        };
        assert_eq!(
            err.to_string(),
            "No writable location for the dump; tried: /a/x.sql (permission denied), /tmp/x.sql (read-only)"
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(OperationError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(
            OperationError::Infrastructure("docker".into()).kind(),
            ErrorKind::Infrastructure
        );
        assert_eq!(
            OperationError::Timeout { what: "x".into(), after: Duration::from_secs(1) }.kind(),
            ErrorKind::Execution
        );
    }
}
