//! datakit query / exec - Run SQL against the configured database
//!
//! Sessions log to the run log like any job would, so every invocation leaves
//! the statement, its parameters and the transaction status lines behind.

use clap::Args;
use colored::Colorize;
use serde_json::json;

use crate::app::AppContext;
use crate::cli::OutputFormat;
use crate::cli::output::{emit_json, emit_jsonl};
use crate::config::BackendKind;
use crate::db::{Backend, Row, Session, SqlValue};
use crate::error::Result;
use crate::utils::format::{single_line, truncate_for_display};

const MAX_CELL_WIDTH: usize = 60;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// SQL to run; use `?` (SQLite) or `$1` (Postgres) placeholders
    pub sql: String,

    /// Positional parameter; integers, floats and NULL are recognised
    #[arg(short = 'p', long = "param", value_name = "VALUE")]
    pub params: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// SQL to run; use `?` (SQLite) or `$1` (Postgres) placeholders
    pub sql: String,

    /// Positional parameter; integers, floats and NULL are recognised
    #[arg(short = 'p', long = "param", value_name = "VALUE")]
    pub params: Vec<String>,

    /// Commit after the statement (implied when auto_commit is configured)
    #[arg(long)]
    pub commit: bool,
}

pub fn run_query(ctx: &AppContext, args: &QueryArgs) -> Result<()> {
    let params = parse_params(&args.params);
    let rows = match ctx.config.database.backend {
        BackendKind::Sqlite => query_with(ctx.sqlite_session()?, &args.sql, &params)?,
        BackendKind::Postgres => query_with(ctx.postgres_session()?, &args.sql, &params)?,
    };
    tracing::debug!(rows = rows.len(), "query finished");

    match ctx.format {
        OutputFormat::Json => emit_json(&rows),
        OutputFormat::Jsonl => emit_jsonl(&rows),
        OutputFormat::Plain => {
            print_plain(&rows);
            Ok(())
        }
        OutputFormat::Human => {
            print_human(&rows);
            Ok(())
        }
    }
}

pub fn run_exec(ctx: &AppContext, args: &ExecArgs) -> Result<()> {
    let params = parse_params(&args.params);
    let affected = match ctx.config.database.backend {
        BackendKind::Sqlite => {
            exec_with(ctx.sqlite_session()?, &args.sql, &params, args.commit)?
        }
        BackendKind::Postgres => {
            exec_with(ctx.postgres_session()?, &args.sql, &params, args.commit)?
        }
    };
    let committed = args.commit || ctx.config.database.auto_commit;
    tracing::debug!(affected, committed, "statement finished");

    match ctx.format {
        OutputFormat::Json | OutputFormat::Jsonl => emit_json(&json!({
            "affected": affected,
            "committed": committed,
        })),
        OutputFormat::Plain => {
            println!("{affected}");
            Ok(())
        }
        OutputFormat::Human => {
            let status = if committed {
                "committed".green()
            } else {
                "rolled back".yellow()
            };
            println!("{} row(s) affected ({status})", affected.to_string().bold());
            Ok(())
        }
    }
}

fn parse_params(raw: &[String]) -> Vec<SqlValue> {
    raw.iter().map(|value| SqlValue::parse_literal(value)).collect()
}

fn query_with<B: Backend>(session: Session<B>, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
    session.scoped(|s| s.execute_query(sql, params))
}

/// Without a commit the session rolls the statement back when it closes.
fn exec_with<B: Backend>(
    session: Session<B>,
    sql: &str,
    params: &[SqlValue],
    commit: bool,
) -> Result<u64> {
    session.scoped(|s| {
        let affected = s.execute_non_query(sql, params)?;
        if commit && !s.auto_commit() {
            s.commit()?;
        }
        Ok(affected)
    })
}

fn print_plain(rows: &[Row]) {
    let Some(first) = rows.first() else {
        return;
    };
    println!("{}", first.columns().join("\t"));
    for row in rows {
        let cells: Vec<String> = row.values().iter().map(plain_cell).collect();
        println!("{}", cells.join("\t"));
    }
}

fn plain_cell(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Text(text) => single_line(text),
        other => other.to_string(),
    }
}

fn print_human(rows: &[Row]) {
    if rows.is_empty() {
        println!("{}", "No rows.".dimmed());
        return;
    }

    for (idx, row) in rows.iter().enumerate() {
        println!("{}", format!("[{}]", idx + 1).bold());
        for (column, value) in row.iter() {
            let rendered = truncate_for_display(&single_line(&value.to_string()), MAX_CELL_WIDTH);
            let rendered = if value.is_null() {
                rendered.dimmed().to_string()
            } else {
                rendered
            };
            println!("  {}: {rendered}", column.cyan());
        }
    }
    println!();
    println!("{} row(s)", rows.len().to_string().bold());
}
