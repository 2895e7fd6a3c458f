//! Shared state for one CLI invocation.

use std::sync::Arc;

use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::db::{PostgresSession, Session, SqliteSession};
use crate::error::Result;
use crate::log::Log;
use crate::mail::Mailer;

/// Loaded configuration, the opened run log and the chosen output format.
#[derive(Debug)]
pub struct AppContext {
    pub config: Config,
    pub log: Arc<Log>,
    pub format: OutputFormat,
}

impl AppContext {
    /// Load configuration and open the run log. Opening applies rotation and
    /// retention pruning.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref())?;
        Self::new(config, cli.format)
    }

    pub fn new(config: Config, format: OutputFormat) -> Result<Self> {
        let log = Arc::new(Log::open(&config.log)?);
        Ok(Self {
            config,
            log,
            format,
        })
    }

    /// An open session on the configured SQLite database.
    pub fn sqlite_session(&self) -> Result<SqliteSession> {
        Session::open(
            self.config.database.sqlite.clone(),
            self.config.database.auto_commit,
            Some(Arc::clone(&self.log)),
        )
    }

    /// An open session on the configured Postgres database.
    pub fn postgres_session(&self) -> Result<PostgresSession> {
        let mut session = Session::new(
            self.config.database.postgres.clone(),
            self.config.database.auto_commit,
            Some(Arc::clone(&self.log)),
        );
        session.open_session()?;
        Ok(session)
    }

    /// A logged-in mailer for the configured SMTP server.
    pub fn mailer(&self) -> Result<Mailer> {
        let mut mailer = Mailer::smtp(self.config.mail.clone(), Some(Arc::clone(&self.log)))?;
        mailer.login()?;
        Ok(mailer)
    }
}
