use std::fmt;
use std::sync::Arc;

use tracing::Level;

use super::{Backend, DriverResult, Row, SqlValue, sanitize_sql};
use crate::error::{DriverError, KitError, Result};
use crate::log::{Diag, Log};
use crate::utils::format::truncate_for_display;

const MAX_LOGGED_RESULT: usize = 2000;

/// A managed connection to one database.
///
/// Every operation logs what it runs and a
/// `transaction [before] >>> [after]` status line, to the attached [`Log`]
/// when there is one and through `tracing` otherwise.
pub struct Session<B: Backend> {
    config: B::Config,
    target: String,
    auto_commit: bool,
    log: Option<Arc<Log>>,
    backend: Option<B>,
}

impl<B: Backend> fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("backend", &B::NAME)
            .field("config", &self.config)
            .field("auto_commit", &self.auto_commit)
            .field("open", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

impl<B: Backend> Session<B> {
    /// Create a closed session. Nothing connects until [`Session::open_session`].
    pub fn new(config: B::Config, auto_commit: bool, log: Option<Arc<Log>>) -> Self {
        let target = B::describe(&config);
        Self {
            config,
            target,
            auto_commit,
            log,
            backend: None,
        }
    }

    pub fn config(&self) -> &B::Config {
        &self.config
    }

    pub const fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub const fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Current transaction status, `None` while closed.
    pub fn status(&self) -> Option<B::Status> {
        self.backend.as_ref().map(B::status)
    }

    /// Connect. Opening an already open session keeps the existing connection.
    pub fn open_session(&mut self) -> Result<()> {
        const CONTEXT: &str = "open_session";
        let diag = Diag::new(self.log.as_deref());

        if self.backend.is_some() {
            diag.emit(
                Level::DEBUG,
                CONTEXT,
                format_args!("{} session already open: [{}]", B::NAME, self.target),
            );
            return Ok(());
        }

        diag.emit(
            Level::DEBUG,
            CONTEXT,
            format_args!("{} open session: [{}]", B::NAME, self.target),
        );
        match B::connect(&self.config) {
            Ok(backend) => {
                self.backend = Some(backend);
                Ok(())
            }
            Err(err) => {
                diag.emit(
                    Level::ERROR,
                    CONTEXT,
                    format_args!("failed to open {} session [{}]: {err}", B::NAME, self.target),
                );
                Err(KitError::session(
                    format!("failed to open {} session [{}]", B::NAME, self.target),
                    err,
                ))
            }
        }
    }

    /// Run a statement that returns rows.
    pub fn execute_query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        const CONTEXT: &str = "execute_query";
        self.run_statement(
            CONTEXT,
            sql,
            params,
            |backend| backend.query(sql, params),
            |diag, rows| {
                diag.emit(Level::DEBUG, CONTEXT, format_args!("rows: [{}]", rows.len()));
                if diag.enabled(Level::DEBUG) {
                    let rendered = rows.iter().map(Row::to_string).collect::<Vec<_>>().join(", ");
                    diag.emit(
                        Level::DEBUG,
                        CONTEXT,
                        format_args!("result: [{}]", truncate_for_display(&rendered, MAX_LOGGED_RESULT)),
                    );
                }
            },
        )
    }

    /// Run a statement that returns no rows and yield the affected row count.
    /// With auto-commit on, a successful statement is committed right away.
    pub fn execute_non_query(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        const CONTEXT: &str = "execute_non_query";
        let count = self.run_statement(
            CONTEXT,
            sql,
            params,
            |backend| backend.execute(sql, params),
            |diag, count| diag.emit(Level::DEBUG, CONTEXT, format_args!("rows: [{count}]")),
        )?;
        if self.auto_commit {
            self.commit()?;
        }
        Ok(count)
    }

    pub fn commit(&mut self) -> Result<()> {
        let message = format!("failed to commit {} session [{}]", B::NAME, self.target);
        self.transition("commit", B::commit, |source| KitError::Commit { message, source })
    }

    pub fn rollback(&mut self) -> Result<()> {
        let message = format!("failed to roll back {} session [{}]", B::NAME, self.target);
        self.transition("rollback", B::rollback, |source| KitError::Rollback {
            message,
            source,
        })
    }

    /// Roll back uncommitted work, then release the connection. Closing a
    /// closed session does nothing.
    pub fn close_session(&mut self) -> Result<()> {
        const CONTEXT: &str = "close_session";

        let needs_rollback = match &self.backend {
            Some(backend) => backend.needs_rollback(),
            None => return Ok(()),
        };
        if needs_rollback {
            self.rollback()?;
        }

        let diag = Diag::new(self.log.as_deref());
        let Some(backend) = self.backend.take() else {
            return Ok(());
        };
        diag.emit(
            Level::DEBUG,
            CONTEXT,
            format_args!("{} close session: [{}]", B::NAME, self.target),
        );
        backend.close().map_err(|err| {
            diag.emit(
                Level::ERROR,
                CONTEXT,
                format_args!("failed to close {} session [{}]: {err}", B::NAME, self.target),
            );
            KitError::session(
                format!("failed to close {} session [{}]", B::NAME, self.target),
                err,
            )
        })
    }

    /// Run `work` against this session and close it afterwards, whatever the
    /// outcome. An error from `work` takes precedence over a close error.
    pub fn scoped<T>(mut self, work: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let outcome = work(&mut self);
        let closed = self.close_session();
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                Diag::new(self.log.as_deref()).emit(
                    Level::ERROR,
                    "scoped",
                    format_args!("close after failure also failed: {close_err}"),
                );
                Err(err)
            }
        }
    }

    fn run_statement<T>(
        &mut self,
        context: &'static str,
        sql: &str,
        params: &[SqlValue],
        run: impl FnOnce(&mut B) -> DriverResult<T>,
        report: impl FnOnce(&Diag<'_>, &T),
    ) -> Result<T> {
        let diag = Diag::new(self.log.as_deref());
        let Some(backend) = self.backend.as_mut() else {
            return Err(not_open::<B>(&diag, context));
        };
        let before = backend.status();

        let statement = sanitize_sql(sql);
        diag.emit(
            Level::DEBUG,
            context,
            format_args!("{} execute SQL: [{}]", B::NAME, self.target),
        );
        diag.emit(Level::DEBUG, context, format_args!("SQL: [{statement}]"));
        if !params.is_empty() {
            diag.emit(Level::DEBUG, context, format_args!("params: [{}]", render_params(params)));
        }

        let outcome = run(&mut *backend);
        match &outcome {
            Ok(value) => report(&diag, value),
            Err(err) => diag.emit(
                Level::ERROR,
                context,
                format_args!("failed to execute SQL: [{statement}]: {err}"),
            ),
        }

        diag.status_line(context, before, backend.status());

        outcome.map_err(|source| KitError::Query {
            message: format!("failed to execute SQL: [{statement}]"),
            source,
        })
    }

    fn transition(
        &mut self,
        context: &'static str,
        action: impl FnOnce(&mut B) -> DriverResult<()>,
        wrap: impl FnOnce(DriverError) -> KitError,
    ) -> Result<()> {
        let diag = Diag::new(self.log.as_deref());
        let Some(backend) = self.backend.as_mut() else {
            return Err(not_open::<B>(&diag, context));
        };
        let before = backend.status();

        diag.emit(
            Level::DEBUG,
            context,
            format_args!("{} {context}: [{}]", B::NAME, self.target),
        );
        let outcome = action(&mut *backend);
        if let Err(err) = &outcome {
            diag.emit(Level::ERROR, context, format_args!("{context} failed: {err}"));
        }

        diag.status_line(context, before, backend.status());

        outcome.map_err(wrap)
    }
}

impl<B: Backend> Drop for Session<B> {
    fn drop(&mut self) {
        if self.backend.is_none() {
            return;
        }
        if let Err(err) = self.close_session() {
            Diag::new(self.log.as_deref()).emit(
                Level::ERROR,
                "drop",
                format_args!("failed to release {} session [{}]: {err}", B::NAME, self.target),
            );
        }
    }
}

fn not_open<B: Backend>(diag: &Diag<'_>, context: &str) -> KitError {
    diag.emit(
        Level::ERROR,
        context,
        format_args!("{} session is not open", B::NAME),
    );
    KitError::session_closed(format!("{} session is not open", B::NAME))
}

fn render_params(params: &[SqlValue]) -> String {
    params
        .iter()
        .map(SqlValue::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
