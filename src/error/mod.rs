//! Error handling for datakit.
//!
//! This module provides:
//! - [`KitError`]: The main error enum for all datakit operations
//! - [`DriverError`]: The underlying database driver failure carried by session errors
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Serializable error with code, category and hint

mod codes;

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use codes::ErrorCode;

/// Failure reported by a database driver.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Postgres(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

/// Main error type for datakit operations.
#[derive(Error, Debug)]
pub enum KitError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Log error: {message}: {source}")]
    Log {
        message: String,
        #[source]
        source: io::Error,
    },

    #[error("Session error: {message}")]
    Session {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    #[error("Query error: {message}: {source}")]
    Query {
        message: String,
        #[source]
        source: DriverError,
    },

    #[error("Commit error: {message}: {source}")]
    Commit {
        message: String,
        #[source]
        source: DriverError,
    },

    #[error("Rollback error: {message}: {source}")]
    Rollback {
        message: String,
        #[source]
        source: DriverError,
    },

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KitError {
    pub(crate) fn log(message: impl Into<String>, source: io::Error) -> Self {
        Self::Log {
            message: message.into(),
            source,
        }
    }

    pub(crate) fn session(message: impl Into<String>, source: impl Into<DriverError>) -> Self {
        Self::Session {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn session_closed(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
            source: None,
        }
    }

    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::ConfigInvalid,
            Self::ConfigNotFound(_) => ErrorCode::ConfigNotFound,
            Self::Log { .. } => ErrorCode::LogUnavailable,
            Self::Session { .. } => ErrorCode::SessionFailed,
            Self::Query { .. } => ErrorCode::QueryFailed,
            Self::Commit { .. } => ErrorCode::CommitFailed,
            Self::Rollback { .. } => ErrorCode::RollbackFailed,
            Self::Mail(_) => ErrorCode::MailFailed,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::SerializationError,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_kit_error(self)
    }
}

/// A structured error with machine-readable code, suggestion and category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "QUERY_FAILED")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 602)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Error category (e.g., "config", "database")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            numeric_code: code.numeric(),
            message: message.into(),
            suggestion: code.suggestion().to_string(),
            category: code.category().to_string(),
        }
    }

    /// Create a structured error from a [`KitError`].
    #[must_use]
    pub fn from_kit_error(err: &KitError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&KitError> for StructuredError {
    fn from(err: &KitError) -> Self {
        Self::from_kit_error(err)
    }
}

/// Result type alias using KitError.
pub type Result<T> = std::result::Result<T, KitError>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_kit_error_code_mapping() {
        assert_eq!(
            KitError::Configuration("bad".into()).code(),
            ErrorCode::ConfigInvalid
        );
        assert_eq!(
            KitError::session_closed("session is not open").code(),
            ErrorCode::SessionFailed
        );
        assert_eq!(
            KitError::log("open log", io::Error::other("denied")).code(),
            ErrorCode::LogUnavailable
        );
        assert_eq!(
            KitError::Mail("login failed".into()).code(),
            ErrorCode::MailFailed
        );
    }

    #[test]
    fn test_driver_error_is_preserved_as_source() {
        let err = KitError::Query {
            message: "failed to execute SQL".into(),
            source: DriverError::Other("no such table: t".into()),
        };
        let source = err.source().expect("query error keeps its driver error");
        assert_eq!(source.to_string(), "no such table: t");
        assert!(err.to_string().contains("no such table: t"));
    }

    #[test]
    fn test_session_error_without_driver_source() {
        let err = KitError::session_closed("session is not open");
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "Session error: session is not open");
    }

    #[test]
    fn test_structured_error_from_kit_error() {
        let err = KitError::Configuration("interval is required".into());
        let structured = err.to_structured();

        assert_eq!(structured.code, ErrorCode::ConfigInvalid);
        assert_eq!(structured.numeric_code, 301);
        assert!(structured.message.contains("interval is required"));
        assert_eq!(structured.category, "config");
    }

    #[test]
    fn test_structured_error_serialization() {
        let err = StructuredError::new(ErrorCode::QueryFailed, "boom");
        let json = serde_json::to_string(&err).unwrap();

        assert!(json.contains("QUERY_FAILED"));
        assert!(json.contains("\"numeric_code\":602"));
        assert!(json.contains("\"category\":\"database\""));
    }

    #[test]
    fn test_structured_error_display() {
        let err = StructuredError::new(ErrorCode::CommitFailed, "commit failed");
        assert_eq!(format!("{err}"), "[E603] commit failed");
    }
}
