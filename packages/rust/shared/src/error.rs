//! Error types for repodoc.
//!
//! Library crates use [`RepoDocError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Classified failure reported by the source-control host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostErrorCode {
    /// The repository does not exist or is not visible.
    RepoNotFound,
    /// The branch, commit or compare range does not exist.
    RefNotFound,
    /// The host rejected the credentials (401/403).
    AuthFailed,
    /// Any other non-success response.
    RequestFailed,
}

impl HostErrorCode {
    /// Stable machine-readable code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepoNotFound => "REPO_NOT_FOUND",
            Self::RefNotFound => "REF_NOT_FOUND",
            Self::AuthFailed => "AUTH_FAILED",
            Self::RequestFailed => "HOST_REQUEST_FAILED",
        }
    }
}

impl std::fmt::Display for HostErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for all repodoc operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoDocError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Malformed `owner/repo[@ref]` reference.
    #[error("invalid repository reference '{input}': {reason}")]
    InvalidReference { input: String, reason: String },

    /// Classified error returned by the source-control host.
    #[error("{code}: {message}")]
    Host {
        code: HostErrorCode,
        message: String,
    },

    /// Clone, copy or archive extraction failed.
    #[error("materialization error: {0}")]
    Materialization(String),

    /// Object storage key does not exist.
    #[error("object not found: {key}")]
    ObjectNotFound { key: String },

    /// Any other object storage failure.
    #[error("object storage error: {0}")]
    ObjectStore(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A persisted state document exists but cannot be trusted.
    #[error("corrupt state document {path}: {message}")]
    StateCorrupt { path: String, message: String },

    /// Caller passed a baseline that belongs to another repository.
    #[error("repository mismatch: expected {expected}, got {actual}")]
    RepoMismatch { expected: String, actual: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RepoDocError>;

impl RepoDocError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an invalid-reference error.
    pub fn invalid_reference(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a classified host error.
    pub fn host(code: HostErrorCode, msg: impl Into<String>) -> Self {
        Self::Host {
            code,
            message: msg.into(),
        }
    }

    /// Create a corrupt-state error for the document at `path`.
    pub fn state_corrupt(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StateCorrupt {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Machine-readable code, when the error carries one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Host { code, .. } => Some(code.as_str()),
            Self::InvalidReference { .. } => Some("INVALID_REFERENCE"),
            Self::StateCorrupt { .. } => Some("STATE_CORRUPT"),
            _ => None,
        }
    }

    /// Whether this is an object-storage "not found" (as opposed to a failure).
    pub fn is_object_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = RepoDocError::config("missing snapshot root");
        assert_eq!(err.to_string(), "config error: missing snapshot root");

        let err = RepoDocError::validation("schema_version 99 not supported");
        assert!(err.to_string().contains("schema_version 99"));
    }

    #[test]
    fn host_error_keeps_code() {
        let err = RepoDocError::host(HostErrorCode::RefNotFound, "branch 'dev' not found");
        assert_eq!(err.code(), Some("REF_NOT_FOUND"));
        assert_eq!(err.to_string(), "REF_NOT_FOUND: branch 'dev' not found");
    }

    #[test]
    fn object_not_found_is_distinct() {
        let missing = RepoDocError::ObjectNotFound { key: "a".into() };
        let failed = RepoDocError::ObjectStore("connection reset".into());
        assert!(missing.is_object_not_found());
        assert!(!failed.is_object_not_found());
    }
}
