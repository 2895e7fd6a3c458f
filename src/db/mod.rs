//! Database sessions.
//!
//! A [`Session`] wraps one connection of a [`Backend`] (SQLite or Postgres)
//! and adds what every migration job needs around it: transaction status
//! logging before and after each operation, optional auto-commit, typed
//! errors that keep the driver failure, and rollback-on-close.

pub mod postgres;
mod session;
pub mod sqlite;
mod value;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

pub use self::postgres::{PostgresBackend, PostgresConfig, TransactionStatus};
pub use session::Session;
pub use sqlite::{IsolationLevel, SqliteBackend, SqliteConfig};
pub use value::{Row, SqlValue};

use crate::error::DriverError;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

pub type SqliteSession = Session<SqliteBackend>;
pub type PostgresSession = Session<PostgresBackend>;

/// A database driver a [`Session`] can manage.
///
/// Implementations own exactly one connection. Every statement method may
/// implicitly open a transaction; [`Backend::status`] reports where the
/// connection stands so the session can log transitions.
pub trait Backend: Sized {
    /// Connection parameters.
    type Config: fmt::Debug + Clone;
    /// Transaction status as reported in status lines.
    type Status: Copy + PartialEq + fmt::Debug + fmt::Display;

    /// Driver name used in log messages.
    const NAME: &'static str;

    fn connect(config: &Self::Config) -> DriverResult<Self>;

    /// Short description of what `config` connects to, safe to log.
    fn describe(config: &Self::Config) -> String;

    fn status(&self) -> Self::Status;

    /// Whether closing now would discard uncommitted work.
    fn needs_rollback(&self) -> bool;

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<Vec<Row>>;

    /// Run a statement that returns no rows; yields the affected row count.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<u64>;

    /// Commit the open transaction. A no-op when none is open.
    fn commit(&mut self) -> DriverResult<()>;

    /// Roll back the open transaction. A no-op when none is open.
    fn rollback(&mut self) -> DriverResult<()>;

    fn close(self) -> DriverResult<()>;
}

static COMMENT_AND_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:--.*)*\n\s*").expect("valid sql sanitizer regex"));

/// Collapse a statement onto one line for logging: every newline, together
/// with surrounding whitespace and any `--` comment before it, becomes a
/// single space.
#[must_use]
pub fn sanitize_sql(sql: &str) -> String {
    COMMENT_AND_NEWLINE.replace_all(sql, " ").trim().to_string()
}

/// First keyword of a statement, skipping whitespace and comments.
pub(crate) fn leading_keyword(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Whether a statement modifies rows (and so needs an open transaction under
/// a non-autocommit isolation level).
pub(crate) fn is_data_change(sql: &str) -> bool {
    let keyword = leading_keyword(sql);
    ["INSERT", "UPDATE", "DELETE", "REPLACE"]
        .iter()
        .any(|dml| keyword.eq_ignore_ascii_case(dml))
}
