//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 3xx: Config errors
//! - 4xx: Log errors
//! - 6xx: Database errors
//! - 7xx: Mail errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for `--format json` output.
///
/// Each variant maps to a numeric code (e.g., `QueryFailed` -> E602).
/// Codes are grouped by category for easy identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E301: Config file or rotation arguments are invalid
    ConfigInvalid,
    /// E302: Explicitly requested config file does not exist
    ConfigNotFound,

    // ========================================
    // Log errors (4xx)
    // ========================================
    /// E401: Log directory or file could not be created, opened or rotated
    LogUnavailable,

    // ========================================
    // Database errors (6xx)
    // ========================================
    /// E601: Connecting, closing or using a closed session failed
    SessionFailed,
    /// E602: Query or non-query execution failed
    QueryFailed,
    /// E603: Commit failed
    CommitFailed,
    /// E604: Rollback failed
    RollbackFailed,

    // ========================================
    // Mail errors (7xx)
    // ========================================
    /// E701: SMTP login, message building or sending failed
    MailFailed,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E901: Filesystem or stream I/O failed
    IoError,
    /// E902: Output serialization failed
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code.
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::ConfigInvalid => 301,
            Self::ConfigNotFound => 302,
            Self::LogUnavailable => 401,
            Self::SessionFailed => 601,
            Self::QueryFailed => 602,
            Self::CommitFailed => 603,
            Self::RollbackFailed => 604,
            Self::MailFailed => 701,
            Self::IoError => 901,
            Self::SerializationError => 902,
        }
    }

    /// Get the code string (e.g., "E602").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get a short recovery hint.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::ConfigInvalid => "Check the [log] and [database] sections of the config file",
            Self::ConfigNotFound => "Pass an existing file with --config or unset DATAKIT_CONFIG",
            Self::LogUnavailable => "Check that the log directory is writable",
            Self::SessionFailed => "Check the connection parameters and that the server is reachable",
            Self::QueryFailed => "Run with -v to see the SQL text and parameters that failed",
            Self::CommitFailed | Self::RollbackFailed => {
                "The connection may have been lost; reopen the session and retry the work"
            }
            Self::MailFailed => "Check the [mail] section: server, port, user and password",
            Self::IoError => "Check file permissions and available disk space",
            Self::SerializationError => "Retry with --format plain",
        }
    }

    /// Get the category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::ConfigInvalid | Self::ConfigNotFound => "config",
            Self::LogUnavailable => "log",
            Self::SessionFailed | Self::QueryFailed | Self::CommitFailed | Self::RollbackFailed => {
                "database"
            }
            Self::MailFailed => "mail",
            Self::IoError | Self::SerializationError => "internal",
        }
    }

    /// Iterate over every code.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::ConfigInvalid,
            Self::ConfigNotFound,
            Self::LogUnavailable,
            Self::SessionFailed,
            Self::QueryFailed,
            Self::CommitFailed,
            Self::RollbackFailed,
            Self::MailFailed,
            Self::IoError,
            Self::SerializationError,
        ]
        .into_iter()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.numeric())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_numeric() {
        assert_eq!(ErrorCode::ConfigInvalid.numeric(), 301);
        assert_eq!(ErrorCode::LogUnavailable.numeric(), 401);
        assert_eq!(ErrorCode::QueryFailed.numeric(), 602);
        assert_eq!(ErrorCode::MailFailed.numeric(), 701);
        assert_eq!(ErrorCode::SerializationError.numeric(), 902);
    }

    #[test]
    fn test_error_code_string() {
        assert_eq!(ErrorCode::SessionFailed.code_string(), "E601");
        assert_eq!(format!("{}", ErrorCode::RollbackFailed), "E604");
    }

    #[test]
    fn test_numeric_codes_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::all() {
            assert!(seen.insert(code.numeric()), "duplicate code {code}");
        }
    }

    #[test]
    fn test_all_codes_have_suggestions_and_categories() {
        for code in ErrorCode::all() {
            assert!(!code.suggestion().is_empty(), "{code:?} has no suggestion");
            assert!(!code.category().is_empty(), "{code:?} has no category");
        }
    }

    #[test]
    fn test_category_matches_numeric_range() {
        for code in ErrorCode::all() {
            let expected = match code.numeric() / 100 {
                3 => "config",
                4 => "log",
                6 => "database",
                7 => "mail",
                _ => "internal",
            };
            assert_eq!(code.category(), expected, "{code:?}");
        }
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::CommitFailed).unwrap();
        assert_eq!(json, "\"COMMIT_FAILED\"");
    }
}
