use std::fmt;

use tracing::Level;

use super::Log;

/// Routes diagnostics to the attached log, or to `tracing`.
pub struct Diag<'a> {
    log: Option<&'a Log>,
}

impl<'a> Diag<'a> {
    pub const fn new(log: Option<&'a Log>) -> Self {
        Self { log }
    }

    pub fn enabled(&self, level: Level) -> bool {
        match self.log {
            Some(log) => log.enabled(level),
            None => {
                if level == Level::DEBUG {
                    tracing::enabled!(Level::DEBUG)
                } else {
                    true
                }
            }
        }
    }

    pub fn emit(&self, level: Level, context: &str, message: fmt::Arguments<'_>) {
        if let Some(log) = self.log {
            log.log_in(level, context, message);
            return;
        }
        if level == Level::ERROR {
            tracing::error!(operation = context, "{message}");
        } else if level == Level::WARN {
            tracing::warn!(operation = context, "{message}");
        } else if level == Level::INFO {
            tracing::info!(operation = context, "{message}");
        } else {
            tracing::debug!(operation = context, "{message}");
        }
    }

    /// The status line is written for every operation, including failed ones.
    pub fn status_line<S: fmt::Display>(&self, context: &str, before: S, after: S) {
        self.emit(
            Level::DEBUG,
            context,
            format_args!("transaction [{before}] >>> [{after}]"),
        );
    }
}
