//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use crate::app::AppContext;
use crate::cli::Commands;
use crate::error::Result;

pub mod log;
pub mod mail;
pub mod query;

pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Log(args) => log::run(ctx, args),
        Commands::Query(args) => query::run_query(ctx, args),
        Commands::Exec(args) => query::run_exec(ctx, args),
        Commands::Mail(args) => mail::run(ctx, args),
    }
}
