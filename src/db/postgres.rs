//! Postgres backend over `sqlx`.
//!
//! Each backend owns one `PgConnection` and a current-thread tokio runtime
//! that drives it, so the session API stays blocking. The server's
//! transaction status is not exposed per statement, so the backend tracks it
//! itself: a `BEGIN` is sent before the first statement on an idle
//! connection, a failed statement marks the transaction as errored, a broken
//! connection makes it unknown, and commit/rollback return it to idle.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgConnection, PgRow, PgTypeInfo,
    PgValueFormat, Postgres,
};
use sqlx::query::Query;
use sqlx::types::{BigDecimal, Uuid};
use sqlx::{Column, Connection, Decode, Encode, Row as _, Type, TypeInfo, ValueRef};
use tokio::runtime::{Builder, Runtime};

use super::{Backend, DriverResult, Row, SqlValue};
use crate::error::DriverError;

/// Transaction status of a Postgres connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// No transaction open.
    Idle,
    /// A statement is in flight.
    ///
    /// Never produced: statements run to completion inside `block_on`. Kept
    /// so the status names cover every libpq state.
    Active,
    /// Inside a transaction with no failed statement.
    InTransaction,
    /// Inside a transaction that has seen a failure; only rollback helps.
    InError,
    /// The connection is gone.
    Unknown,
}

impl TransactionStatus {
    /// Closing in any state but idle or unknown would drop uncommitted work.
    #[must_use]
    pub const fn needs_rollback(self) -> bool {
        !matches!(self, Self::Idle | Self::Unknown)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::InTransaction => "success",
            Self::InError => "error",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct PostgresBackend {
    runtime: Runtime,
    conn: PgConnection,
    status: TransactionStatus,
}

impl fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl PostgresBackend {
    fn begin_implicit(&mut self) -> DriverResult<()> {
        if self.status == TransactionStatus::Idle {
            let outcome = self
                .runtime
                .block_on(sqlx::raw_sql("BEGIN").execute(&mut self.conn));
            self.settle(outcome)?;
        }
        Ok(())
    }

    /// Record the outcome of a statement run inside the transaction.
    fn settle<T>(&mut self, outcome: Result<T, sqlx::Error>) -> DriverResult<T> {
        match outcome {
            Ok(value) => {
                self.status = TransactionStatus::InTransaction;
                Ok(value)
            }
            Err(err) => {
                self.status = status_after(&err);
                Err(err.into())
            }
        }
    }

    /// Send `COMMIT` or `ROLLBACK`. The transaction is over either way.
    fn finish(&mut self, statement: &'static str) -> DriverResult<()> {
        if self.status == TransactionStatus::Idle {
            return Ok(());
        }
        let outcome = self
            .runtime
            .block_on(sqlx::raw_sql(statement).execute(&mut self.conn));
        self.status = match &outcome {
            Err(err) if status_after(err) == TransactionStatus::Unknown => {
                TransactionStatus::Unknown
            }
            _ => TransactionStatus::Idle,
        };
        outcome.map(|_| ()).map_err(Into::into)
    }
}

impl Backend for PostgresBackend {
    type Config = PostgresConfig;
    type Status = TransactionStatus;

    const NAME: &'static str = "PostgreSQL";

    fn connect(config: &PostgresConfig) -> DriverResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| DriverError::Other(format!("cannot start Postgres runtime: {err}")))?;
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password);
        let conn = runtime.block_on(PgConnection::connect_with(&options))?;
        Ok(Self {
            runtime,
            conn,
            status: TransactionStatus::Idle,
        })
    }

    fn describe(config: &PostgresConfig) -> String {
        format!("{}:{}/{}", config.host, config.port, config.database)
    }

    fn status(&self) -> TransactionStatus {
        self.status
    }

    fn needs_rollback(&self) -> bool {
        self.status.needs_rollback()
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<Vec<Row>> {
        self.begin_implicit()?;
        let query = bind_all(sqlx::query(sql), params);
        let outcome = self.runtime.block_on(query.fetch_all(&mut self.conn));
        let rows = self.settle(outcome)?;

        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let columns: Arc<[String]> = first
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        rows.iter()
            .map(|row| -> DriverResult<Row> {
                let values = (0..columns.len())
                    .map(|idx| value_at(row, idx))
                    .collect::<DriverResult<Vec<_>>>()?;
                Ok(Row::new(Arc::clone(&columns), values))
            })
            .collect()
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<u64> {
        self.begin_implicit()?;
        let query = bind_all(sqlx::query(sql), params);
        let outcome = self.runtime.block_on(query.execute(&mut self.conn));
        self.settle(outcome).map(|done| done.rows_affected())
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.finish("COMMIT")
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.finish("ROLLBACK")
    }

    fn close(self) -> DriverResult<()> {
        let Self { runtime, conn, .. } = self;
        runtime.block_on(conn.close()).map_err(Into::into)
    }
}

/// Status after a failed statement: a broken connection leaves nothing to
/// roll back, anything else poisons the open transaction.
fn status_after(err: &sqlx::Error) -> TransactionStatus {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => {
            TransactionStatus::Unknown
        }
        _ => TransactionStatus::InError,
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(UntypedNull),
            SqlValue::Bool(value) => query.bind(*value),
            SqlValue::Integer(value) => query.bind(*value),
            SqlValue::Real(value) => query.bind(*value),
            SqlValue::Text(value) => query.bind(value.as_str()),
            SqlValue::Blob(value) => query.bind(value.as_slice()),
        };
    }
    query
}

/// A NULL parameter sent without a declared type, so the server infers it
/// from the placeholder's context like it would for a literal `NULL`.
#[derive(Debug, Clone, Copy)]
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

fn value_at(row: &PgRow, idx: usize) -> DriverResult<SqlValue> {
    let column = &row.columns()[idx];
    let type_name = column.type_info().name();

    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(SqlValue::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|v| SqlValue::Integer(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|v| SqlValue::Integer(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(SqlValue::Integer),
        "OID" => row
            .try_get::<Option<Oid>, _>(idx)?
            .map(|v| SqlValue::Integer(v.0.into())),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| SqlValue::Real(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(SqlValue::Real),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            row.try_get::<Option<String>, _>(idx)?.map(SqlValue::Text)
        }
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(idx)?.map(SqlValue::Blob),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|v| SqlValue::Text(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|v| SqlValue::Text(v.to_rfc3339())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|v| SqlValue::Text(v.to_string())),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map(|v| SqlValue::Text(v.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)?
            .map(|v| SqlValue::Text(v.to_string())),
        // Text keeps the full precision of NUMERIC.
        "NUMERIC" => row
            .try_get::<Option<BigDecimal>, _>(idx)?
            .map(|v| SqlValue::Text(v.to_string())),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(idx)?
            .map(|v| SqlValue::Text(v.to_string())),
        "INTERVAL" => row
            .try_get::<Option<PgInterval>, _>(idx)?
            .map(|v| SqlValue::Text(format_interval(&v))),
        "BOOL[]" => array_text::<bool>(row, idx)?,
        "INT2[]" => array_text::<i16>(row, idx)?,
        "INT4[]" => array_text::<i32>(row, idx)?,
        "INT8[]" => array_text::<i64>(row, idx)?,
        "FLOAT4[]" => array_text::<f32>(row, idx)?,
        "FLOAT8[]" => array_text::<f64>(row, idx)?,
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => array_text::<String>(row, idx)?,
        other => raw_value(row, idx, other)?,
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

/// One-dimensional arrays as JSON text, e.g. `[1,null,3]`.
fn array_text<T>(row: &PgRow, idx: usize) -> DriverResult<Option<SqlValue>>
where
    T: serde::Serialize,
    for<'r> Vec<Option<T>>: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<Vec<Option<T>>>, _>(idx)?
        .map(|items| serde_json::to_string(&items).map(SqlValue::Text))
        .transpose()
        .map_err(|err| DriverError::Other(format!("cannot render array column {idx}: {err}")))
}

/// Types without a dedicated decoder: text-format values come back as text,
/// binary ones as their wire bytes.
fn raw_value(row: &PgRow, idx: usize, type_name: &str) -> DriverResult<Option<SqlValue>> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(None);
    }
    let format = raw.format();
    let bytes = raw.as_bytes().map_err(|err| {
        DriverError::Other(format!("cannot read {type_name} value in column {idx}: {err}"))
    })?;
    tracing::trace!(column = idx, type_name, "decoding column without a typed decoder");
    Ok(Some(match (format, std::str::from_utf8(bytes)) {
        (PgValueFormat::Text, Ok(text)) => SqlValue::Text(text.to_string()),
        _ => SqlValue::Blob(bytes.to_vec()),
    }))
}

/// Render an interval the way the server's default `postgres` style does,
/// e.g. `1 year 2 mons 3 days 04:05:06.5`.
fn format_interval(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    let plural = |n: i64, unit: &str| {
        if n.abs() == 1 {
            format!("{n} {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };

    let years = i64::from(interval.months / 12);
    let months = i64::from(interval.months % 12);
    if years != 0 {
        parts.push(plural(years, "year"));
    }
    if months != 0 {
        parts.push(plural(months, "mon"));
    }
    if interval.days != 0 {
        parts.push(plural(i64::from(interval.days), "day"));
    }

    let micros = interval.microseconds;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let seconds = total / 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            seconds / 3600,
            seconds / 60 % 60,
            seconds % 60
        );
        let fraction = total % 1_000_000;
        if fraction != 0 {
            let digits = format!("{fraction:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}
