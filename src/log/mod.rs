//! Rotating file log.
//!
//! [`Log`] appends formatted lines to a file whose name is chosen from the
//! rotation policy when the log is opened:
//!
//! ```text
//! 2024-03-09 14:05:07,123 import.rs L42 [INFO]: loaded 47 prefectures
//! ```
//!
//! A log is opened once per process run. Calendar policies write to the file
//! of the current period; size rotation always writes `{stem}.1{ext}`,
//! shifting older files up first when `.1` has outgrown the interval.
//! Retention pruning runs right after opening.
//!
//! Installing [`Log::layer`] on a `tracing` subscriber routes `tracing`
//! events into the same file.

mod diag;
mod layer;
mod rotation;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::Level;
use tracing::level_filters::LevelFilter;

pub(crate) use diag::Diag;
pub use layer::LogLayer;
pub use rotation::{LogTarget, Rotation};

use crate::config::LogConfig;
use crate::error::{KitError, Result};
use crate::utils::fs::ensure_dir;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";
const START_BANNER: &str = "======================================== processing started ========================================";
const END_BANNER: &str = "======================================== processing finished ========================================";

/// An open, append-only log file.
pub struct Log {
    path: PathBuf,
    target: LogTarget,
    level: LevelFilter,
    rotation: Option<Rotation>,
    file: File,
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log")
            .field("path", &self.path)
            .field("level", &self.level)
            .field("rotation", &self.rotation)
            .finish_non_exhaustive()
    }
}

impl Log {
    /// Open the log described by `config` at the current local time.
    pub fn open(config: &LogConfig) -> Result<Self> {
        Self::open_at(config, Local::now())
    }

    /// Open the log as if the current local time were `now`.
    pub fn open_at(config: &LogConfig, now: DateTime<Local>) -> Result<Self> {
        if config.rotation == Some(Rotation::Size) && config.interval.is_none() {
            return Err(KitError::Configuration(
                "size rotation ('b') requires an interval in bytes".to_string(),
            ));
        }

        let absolute = std::path::absolute(&config.file_path).map_err(|err| {
            KitError::log(
                format!("cannot resolve log path {}", config.file_path.display()),
                err,
            )
        })?;
        let target = LogTarget::from_path(&absolute)?;
        ensure_dir(target.dir()).map_err(|err| {
            KitError::log(
                format!("cannot create log directory {}", target.dir().display()),
                err,
            )
        })?;

        let mut renamed = 0;
        let path = match (config.rotation, config.interval) {
            (Some(Rotation::Size), Some(max_bytes)) => {
                let (path, count) = target.rotate_by_size(max_bytes).map_err(|err| {
                    KitError::log(
                        format!("cannot rotate log files in {}", target.dir().display()),
                        err,
                    )
                })?;
                renamed = count;
                path
            }
            (rotation, _) => target.effective_path(rotation, &now),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| KitError::log(format!("cannot open log file {}", path.display()), err))?;

        let log = Self {
            path,
            target,
            level: config.level,
            rotation: config.rotation,
            file,
        };

        if renamed > 0 {
            log.log_in(
                Level::DEBUG,
                "open",
                format!("rotated {renamed} log file(s) before opening {}", log.path.display()),
            );
        }
        if let Some(rotation) = config.rotation.filter(|_| config.backup_count > 0) {
            log.prune(rotation, config.backup_count);
        }

        Ok(log)
    }

    /// Delete the oldest rotated files so at most `keep` remain.
    ///
    /// Listing and deletion failures are recorded in the log itself and do
    /// not fail the open.
    fn prune(&self, rotation: Rotation, keep: usize) {
        let files = match self.target.rotated_files(rotation) {
            Ok(files) => files,
            Err(err) => {
                self.log_in(
                    Level::WARN,
                    "prune",
                    format!(
                        "cannot list rotated logs in {}: {err}",
                        self.target.dir().display()
                    ),
                );
                return;
            }
        };

        let excess = files.len().saturating_sub(keep);
        for stale in files.iter().take(excess) {
            if let Err(err) = std::fs::remove_file(stale) {
                self.log_in(
                    Level::WARN,
                    "prune",
                    format!("cannot delete old log file \"{}\": {err}", stale.display()),
                );
            }
        }
    }

    /// Append `message` at `level`, tagged with the caller's file and line.
    #[track_caller]
    pub fn log(&self, level: Level, message: impl fmt::Display) {
        let caller = Location::caller();
        self.write_line(
            level,
            layer::source_file_name(caller.file()),
            &format!("L{}", caller.line()),
            &message,
        );
    }

    /// Append `message` at `level` under an explicit context label, usually
    /// the name of the operation that produced it.
    #[track_caller]
    pub fn log_in(&self, level: Level, context: &str, message: impl fmt::Display) {
        let caller = Location::caller();
        self.write_line(
            level,
            layer::source_file_name(caller.file()),
            context,
            &message,
        );
    }

    #[track_caller]
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::DEBUG, message);
    }

    #[track_caller]
    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::INFO, message);
    }

    #[track_caller]
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::WARN, message);
    }

    #[track_caller]
    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::ERROR, message);
    }

    /// Write the "processing started" banner at INFO.
    #[track_caller]
    pub fn mark_start(&self) {
        self.log(Level::INFO, START_BANNER);
    }

    /// Write the "processing finished" banner at INFO.
    #[track_caller]
    pub fn mark_end(&self) {
        self.log(Level::INFO, END_BANNER);
    }

    /// Whether a message at `level` would be written.
    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    /// The file this log appends to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn level(&self) -> LevelFilter {
        self.level
    }

    #[must_use]
    pub const fn rotation(&self) -> Option<Rotation> {
        self.rotation
    }

    /// Rotated files currently on disk for this log, oldest first.
    pub fn rotated_files(&self) -> io::Result<Vec<PathBuf>> {
        match self.rotation {
            Some(rotation) => self.target.rotated_files(rotation),
            None => Ok(Vec::new()),
        }
    }

    /// A `tracing` layer that writes events into this log.
    #[must_use]
    pub fn layer(self: &Arc<Self>) -> LogLayer {
        LogLayer::new(Arc::clone(self))
    }

    pub(crate) fn write_line(
        &self,
        level: Level,
        file: &str,
        context: &str,
        message: &dyn fmt::Display,
    ) {
        if !self.enabled(level) {
            return;
        }
        let line = format_line(&Local::now(), file, context, level, message);
        if let Err(err) = (&self.file).write_all(line.as_bytes()) {
            eprintln!(
                "datakit: failed to write to log file {}: {err}",
                self.path.display()
            );
        }
    }
}

fn format_line(
    now: &DateTime<Local>,
    file: &str,
    context: &str,
    level: Level,
    message: &dyn fmt::Display,
) -> String {
    format!(
        "{} {file} {context} [{level}]: {message}\n",
        now.format(TIMESTAMP_FORMAT)
    )
}
