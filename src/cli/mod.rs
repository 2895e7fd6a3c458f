//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use output::OutputFormat;

pub mod commands;
pub mod output;

/// datakit - rotating run log and database sessions for data-migration jobs
#[derive(Parser, Debug)]
#[command(name = "datakit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (human, json, jsonl, plain)
    #[arg(long, short = 'O', global = true, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Increase stderr verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress stderr diagnostics (the log file is still written)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: ~/.config/datakit/config.toml, then ./datakit.toml)
    #[arg(long, global = true, env = "DATAKIT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the run log (rotating and pruning it) and write a framed entry
    Log(commands::log::LogArgs),

    /// Run a query against the configured database and print the rows
    Query(commands::query::QueryArgs),

    /// Run a statement that returns no rows and print the affected count
    Exec(commands::query::ExecArgs),

    /// Send a plain-text mail through the configured SMTP server
    Mail(commands::mail::MailArgs),
}
