//! Layered configuration.
//!
//! Defaults are patched by TOML files (an explicit file, or the global file
//! followed by `./datakit.toml`) and finally by `DATAKIT_*` environment
//! variables.
//!
//! ```toml
//! [log]
//! file_path = "logs/migration.log"
//! level = "info"
//! rotation = "d"
//! backup_count = 7
//!
//! [database]
//! backend = "postgres"
//! auto_commit = false
//!
//! [database.postgres]
//! host = "db.internal"
//! database = "census"
//! user = "loader"
//! password = "..."
//!
//! [mail]
//! server = "smtp.example.com"
//! port = 587
//! user = "loader@example.com"
//! password = "..."
//! name = "nightly load"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use tracing::level_filters::LevelFilter;

use crate::db::{IsolationLevel, PostgresConfig, SqliteConfig};
use crate::error::{KitError, Result};
use crate::log::Rotation;
use crate::mail::MailConfig;

const CONFIG_ENV: &str = "DATAKIT_CONFIG";
const PROJECT_CONFIG: &str = "datakit.toml";
const MEMORY_DATABASE: &str = ":memory:";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub log: LogConfig,
    pub database: DatabaseConfig,
    pub mail: MailConfig,
}

impl Config {
    /// Load configuration the way the CLI does: explicit path (argument or
    /// `DATAKIT_CONFIG`), otherwise global then project file, then
    /// environment overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        Self::resolve(explicit_path, &Self::default_paths(), |key| {
            std::env::var(key).ok()
        })
    }

    /// Defaults patched by a single file, without environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::resolve(Some(path), &[], |_| None)
    }

    /// Files merged when no explicit path is given, lowest priority first.
    #[must_use]
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("datakit").join("config.toml"));
        }
        paths.push(PathBuf::from(PROJECT_CONFIG));
        paths
    }

    pub(crate) fn resolve<F>(explicit_path: Option<&Path>, layered: &[PathBuf], lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| lookup(CONFIG_ENV).map(PathBuf::from));

        if let Some(path) = explicit {
            let patch = Self::load_patch(&path)?
                .ok_or_else(|| KitError::ConfigNotFound(path.display().to_string()))?;
            config.merge_patch(patch);
        } else {
            for path in layered {
                if let Some(patch) = Self::load_patch(path)? {
                    config.merge_patch(patch);
                }
            }
        }

        config.apply_env_overrides(&lookup)?;

        Ok(config)
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path).map_err(|err| {
            KitError::Configuration(format!("read config {}: {err}", path.display()))
        })?;
        let mut patch: ConfigPatch = toml::from_str(&raw).map_err(|err| {
            KitError::Configuration(format!("parse config {}: {err}", path.display()))
        })?;
        if let Some(base) = path.parent() {
            patch.rebase(base);
        }
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.log {
            self.log.merge(patch);
        }
        if let Some(patch) = patch.database {
            self.database.merge(patch);
        }
        if let Some(patch) = patch.mail {
            patch.apply(&mut self.mail);
        }
    }

    fn apply_env_overrides<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DATAKIT_LOG_FILE_PATH") {
            self.log.file_path = PathBuf::from(value);
        }
        if let Some(value) = env_parsed(lookup, "DATAKIT_LOG_LEVEL", parse_level)? {
            self.log.level = value;
        }
        if let Some(value) = env_parsed(lookup, "DATAKIT_LOG_ROTATION", |raw| {
            if raw.is_empty() {
                Ok(None)
            } else {
                raw.parse::<Rotation>().map(Some)
            }
        })? {
            self.log.rotation = value;
        }
        if let Some(value) = env_parsed(lookup, "DATAKIT_LOG_INTERVAL", str::parse::<u64>)? {
            self.log.interval = Some(value);
        }
        if let Some(value) = env_parsed(lookup, "DATAKIT_LOG_BACKUP_COUNT", str::parse::<usize>)? {
            self.log.backup_count = value;
        }

        if let Some(value) = env_parsed(lookup, "DATAKIT_DB_BACKEND", str::parse::<BackendKind>)? {
            self.database.backend = value;
        }
        if let Some(value) = env_parsed(lookup, "DATAKIT_DB_AUTO_COMMIT", parse_bool)? {
            self.database.auto_commit = value;
        }

        if let Some(value) = lookup("DATAKIT_SQLITE_PATH") {
            self.database.sqlite.path = PathBuf::from(value);
        }
        if let Some(value) = env_parsed(
            lookup,
            "DATAKIT_SQLITE_ISOLATION_LEVEL",
            str::parse::<IsolationLevel>,
        )? {
            self.database.sqlite.isolation_level = value;
        }

        if let Some(value) = lookup("DATAKIT_PG_HOST") {
            self.database.postgres.host = value;
        }
        if let Some(value) = env_parsed(lookup, "DATAKIT_PG_PORT", str::parse::<u16>)? {
            self.database.postgres.port = value;
        }
        if let Some(value) = lookup("DATAKIT_PG_DATABASE") {
            self.database.postgres.database = value;
        }
        if let Some(value) = lookup("DATAKIT_PG_USER") {
            self.database.postgres.user = value;
        }
        if let Some(value) = lookup("DATAKIT_PG_PASSWORD") {
            self.database.postgres.password = value;
        }

        if let Some(value) = lookup("DATAKIT_MAIL_SERVER") {
            self.mail.server = value;
        }
        if let Some(value) = env_parsed(lookup, "DATAKIT_MAIL_PORT", str::parse::<u16>)? {
            self.mail.port = value;
        }
        if let Some(value) = lookup("DATAKIT_MAIL_USER") {
            self.mail.user = value;
        }
        if let Some(value) = lookup("DATAKIT_MAIL_PASSWORD") {
            self.mail.password = value;
        }
        if let Some(value) = lookup("DATAKIT_MAIL_NAME") {
            self.mail.name = value;
        }

        Ok(())
    }
}

/// Where and how the run log is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub file_path: PathBuf,
    pub level: LevelFilter,
    pub rotation: Option<Rotation>,
    /// Maximum size in bytes of `.1` under size rotation.
    pub interval: Option<u64>,
    /// Rotated files to keep; 0 keeps all of them.
    pub backup_count: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from("logs/datakit.log"),
            level: LevelFilter::DEBUG,
            rotation: None,
            interval: None,
            backup_count: 0,
        }
    }
}

impl LogConfig {
    fn merge(&mut self, patch: LogPatch) {
        if let Some(value) = patch.file_path {
            self.file_path = value;
        }
        if let Some(value) = patch.level {
            self.level = value;
        }
        if patch.rotation.is_some() {
            self.rotation = patch.rotation;
        }
        if patch.interval.is_some() {
            self.interval = patch.interval;
        }
        if let Some(value) = patch.backup_count {
            self.backup_count = value;
        }
    }
}

/// Which database driver sessions use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Postgres,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(format!(
                "unknown database backend '{other}' (expected sqlite or postgres)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseConfig {
    pub backend: BackendKind,
    /// Commit after every successful non-query.
    pub auto_commit: bool,
    pub sqlite: SqliteConfig,
    pub postgres: PostgresConfig,
}

impl DatabaseConfig {
    fn merge(&mut self, patch: DatabasePatch) {
        if let Some(value) = patch.backend {
            self.backend = value;
        }
        if let Some(value) = patch.auto_commit {
            self.auto_commit = value;
        }
        if let Some(patch) = patch.sqlite {
            if let Some(value) = patch.path {
                self.sqlite.path = value;
            }
            if let Some(value) = patch.isolation_level {
                self.sqlite.isolation_level = value;
            }
        }
        if let Some(patch) = patch.postgres {
            if let Some(value) = patch.host {
                self.postgres.host = value;
            }
            if let Some(value) = patch.port {
                self.postgres.port = value;
            }
            if let Some(value) = patch.database {
                self.postgres.database = value;
            }
            if let Some(value) = patch.user {
                self.postgres.user = value;
            }
            if let Some(value) = patch.password {
                self.postgres.password = value;
            }
        }
    }
}

/// Parse a level name. `warning` and `critical` are accepted as aliases of
/// `warn` and `error`.
pub fn parse_level(name: &str) -> std::result::Result<LevelFilter, String> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "critical" => Ok(LevelFilter::ERROR),
        "off" | "none" => Ok(LevelFilter::OFF),
        other => Err(format!(
            "unknown log level '{other}' (expected trace, debug, info, warn, error, critical or off)"
        )),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub log: Option<LogPatch>,
    pub database: Option<DatabasePatch>,
    pub mail: Option<MailPatch>,
}

impl ConfigPatch {
    /// Resolve relative paths against the directory of the file they came from.
    fn rebase(&mut self, base: &Path) {
        if let Some(path) = self.log.as_mut().and_then(|log| log.file_path.as_mut()) {
            *path = rebase_path(base, path);
        }
        if let Some(path) = self
            .database
            .as_mut()
            .and_then(|db| db.sqlite.as_mut())
            .and_then(|sqlite| sqlite.path.as_mut())
        {
            *path = rebase_path(base, path);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LogPatch {
    pub file_path: Option<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_level")]
    pub level: Option<LevelFilter>,
    pub rotation: Option<Rotation>,
    pub interval: Option<u64>,
    pub backup_count: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabasePatch {
    pub backend: Option<BackendKind>,
    pub auto_commit: Option<bool>,
    pub sqlite: Option<SqlitePatch>,
    pub postgres: Option<PostgresPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SqlitePatch {
    pub path: Option<PathBuf>,
    pub isolation_level: Option<IsolationLevel>,
}

#[derive(Clone, Default, Deserialize)]
struct PostgresPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for PostgresPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresPatch")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Default, Deserialize)]
struct MailPatch {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

impl MailPatch {
    fn apply(self, mail: &mut MailConfig) {
        if let Some(value) = self.server {
            mail.server = value;
        }
        if let Some(value) = self.port {
            mail.port = value;
        }
        if let Some(value) = self.user {
            mail.user = value;
        }
        if let Some(value) = self.password {
            mail.password = value;
        }
        if let Some(value) = self.name {
            mail.name = value;
        }
    }
}

impl fmt::Debug for MailPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailPatch")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("name", &self.name)
            .finish()
    }
}

fn deserialize_level<'de, D>(deserializer: D) -> std::result::Result<Option<LevelFilter>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_level(&raw).map(Some).map_err(serde::de::Error::custom)
}

fn rebase_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || path == Path::new(MEMORY_DATABASE) {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}

fn env_parsed<F, T, E, P>(lookup: &F, key: &str, parse: P) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    E: fmt::Display,
    P: FnOnce(&str) -> std::result::Result<T, E>,
{
    match lookup(key) {
        Some(value) => parse(value.trim()).map(Some).map_err(|err| {
            KitError::Configuration(format!("invalid {key} value {value}: {err}"))
        }),
        None => Ok(None),
    }
}
