use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::error::{KitError, Result, StructuredError};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable formatted output with colors (default)
    #[default]
    Human,
    /// Pretty-printed JSON
    Json,
    /// Newline-delimited JSON (one object per line)
    Jsonl,
    /// Plain tab-separated text without colors
    Plain,
}

impl OutputFormat {
    /// Check if this format should use colors
    #[must_use]
    pub const fn use_colors(&self) -> bool {
        matches!(self, Self::Human)
    }

    /// Check if this format is machine-readable
    #[must_use]
    pub const fn is_machine_readable(&self) -> bool {
        matches!(self, Self::Json | Self::Jsonl)
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print each item as one compact JSON line.
pub fn emit_jsonl<T: Serialize>(items: &[T]) -> Result<()> {
    for item in items {
        println!("{}", serde_json::to_string(item)?);
    }
    Ok(())
}

/// Report a failed command: structured JSON on stdout for machine formats,
/// a colored message on stderr otherwise.
pub fn report_error(format: OutputFormat, err: &KitError) {
    let structured = StructuredError::from(err);
    if format.is_machine_readable() {
        let body = serde_json::json!({ "error": structured });
        println!("{}", serde_json::to_string(&body).unwrap_or_default());
        return;
    }

    eprintln!("{} {err}", "Error:".red().bold());
    if format.use_colors() {
        eprintln!("  {} {}", "hint:".dimmed(), structured.suggestion);
    }
}
