//! datakit - Run log and database sessions for data-migration jobs

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use datakit::Result;
use datakit::app::AppContext;
use datakit::cli::Cli;
use datakit::cli::output::report_error;
use datakit::log::Log;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if !cli.format.use_colors() {
        colored::control::set_override(false);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(cli.format, &e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let ctx = AppContext::from_cli(cli)?;
    init_tracing(cli, &ctx.log);
    datakit::cli::commands::run(&ctx, &cli.command)
}

/// The run log receives events at its configured level; stderr follows -v/-q.
fn init_tracing(cli: &Cli, log: &std::sync::Arc<Log>) {
    let file_layer = log.layer().with_filter(log.level());

    let stderr_layer = (!cli.quiet).then(|| {
        let filter = match cli.verbose {
            0 => "warn,datakit=info",
            1 => "info,datakit=debug",
            2 => "debug,datakit=trace",
            _ => "trace",
        };
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(cli.format.use_colors())
            .with_target(false)
            .with_filter(env_filter)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();
}
