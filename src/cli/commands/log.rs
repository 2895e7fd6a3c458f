//! datakit log - Write a framed entry to the run log
//!
//! Opening the log already applied rotation and pruning; this command writes
//! the start banner, an optional message and the end banner, then reports
//! which files the log currently spans.

use std::path::Path;

use clap::Args;
use colored::Colorize;
use serde_json::json;
use tracing::Level;

use crate::app::AppContext;
use crate::cli::OutputFormat;
use crate::cli::output::emit_json;
use crate::error::{KitError, Result};
use crate::utils::format::format_size;
use crate::utils::fs::file_size;

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Message to write between the start and end banners
    #[arg(long, short)]
    pub message: Option<String>,

    /// Level of --message (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub level: Level,
}

pub fn run(ctx: &AppContext, args: &LogArgs) -> Result<()> {
    let log = &ctx.log;

    log.mark_start();
    if let Some(message) = &args.message {
        log.log(args.level, message);
    }
    log.mark_end();

    let rotated = log
        .rotated_files()
        .map_err(|err| KitError::log("cannot list rotated log files", err))?;
    let mut files = Vec::with_capacity(rotated.len());
    for path in &rotated {
        let bytes = file_size(path)
            .map_err(|err| KitError::log(format!("cannot stat {}", path.display()), err))?
            .unwrap_or(0);
        files.push((path.as_path(), bytes));
    }
    tracing::debug!(active = %log.path().display(), rotated = files.len(), "log entry written");

    match ctx.format {
        OutputFormat::Json | OutputFormat::Jsonl => emit_json(&json!({
            "active": log.path(),
            "level": log.level().to_string(),
            "rotation": log.rotation().map(|rotation| rotation.to_string()),
            "rotated": files
                .iter()
                .map(|(path, bytes)| json!({ "path": path, "bytes": bytes }))
                .collect::<Vec<_>>(),
        })),
        OutputFormat::Plain => {
            println!("{}", log.path().display());
            for (path, bytes) in &files {
                println!("{}\t{bytes}", path.display());
            }
            Ok(())
        }
        OutputFormat::Human => {
            print_human(log.path(), &files);
            Ok(())
        }
    }
}

fn print_human(active: &Path, files: &[(&Path, u64)]) {
    println!("{} {}", "Active log:".bold(), active.display().to_string().cyan());
    if files.is_empty() {
        return;
    }

    println!();
    println!("{}", format!("Rotated files ({})", files.len()).bold());
    println!("{}", "─".repeat(60));
    for (path, bytes) in files {
        let marker = if *path == active { "*" } else { " " };
        println!(
            "{marker} {} ({})",
            path.display(),
            format_size(*bytes).dimmed()
        );
    }
}
