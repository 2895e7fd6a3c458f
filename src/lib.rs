//! datakit - shared toolkit for data-migration jobs
//!
//! A rotating file log ([`log::Log`]) and transaction-aware database sessions
//! ([`db::Session`]) over SQLite and PostgreSQL, plus the `datakit` CLI that
//! drives them from scripts.

pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod log;
pub mod mail;
pub mod test_utils;
pub mod utils;

pub use error::{KitError, Result};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
