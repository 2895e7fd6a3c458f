//! SQLite backend.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};

use super::{Backend, DriverResult, Row, Session, SqlValue, is_data_change};
use crate::error::{DriverError, Result};
use crate::log::Log;
use crate::utils::fs::ensure_dir;

const MEMORY_PATH: &str = ":memory:";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Transaction mode used for implicitly opened transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    Deferred,
    #[default]
    Immediate,
    Exclusive,
    /// No implicit transactions; every statement commits on its own.
    Autocommit,
}

impl IsolationLevel {
    const fn begin_statement(self) -> Option<&'static str> {
        match self {
            Self::Deferred => Some("BEGIN DEFERRED"),
            Self::Immediate => Some("BEGIN IMMEDIATE"),
            Self::Exclusive => Some("BEGIN EXCLUSIVE"),
            Self::Autocommit => None,
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Deferred => "DEFERRED",
            Self::Immediate => "IMMEDIATE",
            Self::Exclusive => "EXCLUSIVE",
            Self::Autocommit => "NONE",
        };
        write!(f, "{name}")
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    /// An empty string means `DEFERRED`, matching plain `BEGIN`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "DEFERRED" => Ok(Self::Deferred),
            "IMMEDIATE" => Ok(Self::Immediate),
            "EXCLUSIVE" => Ok(Self::Exclusive),
            "NONE" | "AUTOCOMMIT" => Ok(Self::Autocommit),
            other => Err(format!(
                "unknown isolation level '{other}' (expected DEFERRED, IMMEDIATE, EXCLUSIVE or NONE)"
            )),
        }
    }
}

impl<'de> serde::Deserialize<'de> for IsolationLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
    pub isolation_level: IsolationLevel,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::new("datakit.db")
    }
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            isolation_level: IsolationLevel::default(),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    #[must_use]
    pub const fn with_isolation_level(mut self, isolation_level: IsolationLevel) -> Self {
        self.isolation_level = isolation_level;
        self
    }
}

pub struct SqliteBackend {
    conn: Connection,
    isolation_level: IsolationLevel,
}

impl fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("isolation_level", &self.isolation_level)
            .field("in_transaction", &!self.conn.is_autocommit())
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open the transaction a data change needs, if none is open yet.
    fn begin_implicit(&self, sql: &str) -> DriverResult<()> {
        match self.isolation_level.begin_statement() {
            Some(begin) if self.conn.is_autocommit() && is_data_change(sql) => {
                self.conn.execute_batch(begin)?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Backend for SqliteBackend {
    type Config = SqliteConfig;
    /// Whether a transaction is open.
    type Status = bool;

    const NAME: &'static str = "SQLite";

    fn connect(config: &SqliteConfig) -> DriverResult<Self> {
        let parent = config
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty());
        if let Some(parent) = parent.filter(|_| config.path.as_os_str() != MEMORY_PATH) {
            ensure_dir(parent).map_err(|err| {
                DriverError::Other(format!(
                    "cannot create database directory {}: {err}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(&config.path)?;
        register_regexp(&conn)?;

        Ok(Self {
            conn,
            isolation_level: config.isolation_level,
        })
    }

    fn describe(config: &SqliteConfig) -> String {
        config.path.display().to_string()
    }

    fn status(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn needs_rollback(&self) -> bool {
        self.status()
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<Vec<Row>> {
        self.begin_implicit(sql)?;

        let mut stmt = self.conn.prepare(sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = stmt.query(params_from_iter(params))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..columns.len())
                .map(|idx| row.get_ref(idx).map(value_from_ref))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<u64> {
        self.begin_implicit(sql)?;

        // Stepped through `query` so PRAGMA and RETURNING statements run too.
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        while rows.next()?.is_some() {}
        drop(rows);
        Ok(self.conn.changes())
    }

    fn commit(&mut self) -> DriverResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn close(self) -> DriverResult<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }
}

impl Session<SqliteBackend> {
    /// Create a session and connect it immediately.
    pub fn open(config: SqliteConfig, auto_commit: bool, log: Option<Arc<Log>>) -> Result<Self> {
        let mut session = Self::new(config, auto_commit, log);
        session.open_session()?;
        Ok(session)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Self::Bool(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
            Self::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            Self::Real(value) => ToSqlOutput::Owned(Value::Real(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            Self::Blob(value) => ToSqlOutput::Borrowed(ValueRef::Blob(value)),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(value) => SqlValue::Integer(value),
        ValueRef::Real(value) => SqlValue::Real(value),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

/// `value REGEXP pattern`: true when the pattern matches anywhere in the
/// value. Compiled patterns are cached per statement.
///
/// A NULL value never matches, so `col REGEXP 'None'` does not select NULL
/// rows the way a stringifying implementation would.
fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |raw| -> std::result::Result<Regex, BoxError> {
                let source = text_of(raw).ok_or("REGEXP pattern must not be NULL")?;
                Ok(Regex::new(&source)?)
            })?;
            Ok(text_of(ctx.get_raw(1)).is_some_and(|text| pattern.is_match(&text)))
        },
    )
}

fn text_of(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(value) => Some(value.to_string()),
        ValueRef::Real(value) => Some(value.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
