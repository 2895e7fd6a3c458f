//! Integration tests for datakit
//!
//! These exercise the run log and database sessions together the way a
//! migration job uses them: real files in a temp directory, a real SQLite
//! database, and Postgres when a server is configured.

mod config_tests;
mod fixture;
mod postgres_tests;
mod rotation_tests;
mod sqlite_session_tests;
