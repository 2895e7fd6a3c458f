//! Run against a live server by setting `DATAKIT_TEST_PG_HOST` (and
//! optionally `DATAKIT_TEST_PG_PORT`, `_DB`, `_USER`, `_PASSWORD`).
//! Without it these tests return early.

use datakit::KitError;
use datakit::db::{PostgresBackend, PostgresConfig, Session, SqlValue, TransactionStatus};
use datakit::test_utils::fixtures::LogDirFixture;
use datakit::test_utils::logging::TestLogger;

use super::fixture::open_shared;
use crate::assert_file_contains;

fn server() -> Option<PostgresConfig> {
    let host = std::env::var("DATAKIT_TEST_PG_HOST").ok()?;
    let var = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
    Some(PostgresConfig {
        host,
        port: var("DATAKIT_TEST_PG_PORT", "5432").parse().expect("numeric port"),
        database: var("DATAKIT_TEST_PG_DB", "postgres"),
        user: var("DATAKIT_TEST_PG_USER", "postgres"),
        password: var("DATAKIT_TEST_PG_PASSWORD", ""),
    })
}

macro_rules! require_server {
    () => {
        match server() {
            Some(config) => config,
            None => {
                println!("[SKIP] DATAKIT_TEST_PG_HOST not set");
                return;
            }
        }
    };
}

fn table_name(test: &str) -> String {
    format!("datakit_it_{test}_{}", std::process::id())
}

#[test]
fn transaction_status_follows_statements() {
    let config = require_server!();
    let log = TestLogger::new("transaction_status_follows_statements");
    let fixture = LogDirFixture::new();
    let run_log = open_shared(&fixture.log_config("pg.log"));
    let table = table_name("status");

    let mut session = Session::<PostgresBackend>::new(config.clone(), false, Some(run_log.clone()));
    session.open_session().unwrap();
    assert_eq!(session.status(), Some(TransactionStatus::Idle));

    log.step("Create and fill the table in one transaction");
    session
        .execute_non_query(&format!("CREATE TABLE {table} (id INTEGER, name TEXT)"), &[])
        .unwrap();
    assert_eq!(session.status(), Some(TransactionStatus::InTransaction));
    let inserted = session
        .execute_non_query(
            &format!("INSERT INTO {table} (id, name) VALUES ($1, $2)"),
            &[SqlValue::from(1), "Hakata".into()],
        )
        .unwrap();
    assert_eq!(inserted, 1);
    session.commit().unwrap();
    assert_eq!(session.status(), Some(TransactionStatus::Idle));

    log.step("A failing statement leaves the transaction in error until rollback");
    let err = session
        .execute_query(&format!("SELECT missing_column FROM {table}"), &[])
        .unwrap_err();
    assert!(matches!(err, KitError::Query { .. }), "{err:?}");
    assert_eq!(session.status(), Some(TransactionStatus::InError));
    session.rollback().unwrap();
    assert_eq!(session.status(), Some(TransactionStatus::Idle));

    let rows = session
        .execute_query(&format!("SELECT id, name FROM {table}"), &[])
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id").and_then(SqlValue::as_i64), Some(1));

    session
        .execute_non_query(&format!("DROP TABLE {table}"), &[])
        .unwrap();
    session.commit().unwrap();
    session.close_session().unwrap();

    assert_file_contains!(run_log.path(), "PostgreSQL open session: [");
    assert_file_contains!(run_log.path(), "transaction [idle] >>> [success]");
    assert_file_contains!(run_log.path(), "transaction [success] >>> [error]");

    log.pass();
}

#[test]
fn close_rolls_back_uncommitted_rows() {
    let config = require_server!();
    let table = table_name("close");

    Session::<PostgresBackend>::new(config.clone(), true, None)
        .scoped(|s| {
            s.open_session()?;
            s.execute_non_query(&format!("CREATE TABLE {table} (id INTEGER)"), &[])
        })
        .unwrap();

    let mut session = Session::<PostgresBackend>::new(config.clone(), false, None);
    session.open_session().unwrap();
    session
        .execute_non_query(&format!("INSERT INTO {table} VALUES (1)"), &[])
        .unwrap();
    drop(session);

    let rows = Session::<PostgresBackend>::new(config, true, None)
        .scoped(|s| {
            s.open_session()?;
            let rows = s.execute_query(&format!("SELECT id FROM {table}"), &[])?;
            s.execute_non_query(&format!("DROP TABLE {table}"), &[])?;
            Ok(rows)
        })
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn query_decodes_numeric_uuid_interval_and_arrays() {
    let config = require_server!();

    let rows = Session::<PostgresBackend>::new(config, false, None)
        .scoped(|s| {
            s.open_session()?;
            s.execute_query(
                "SELECT avg(x) AS mean, sum(x::bigint) AS total, gen_random_uuid() AS id, \
                 interval '1 day 02:00:00' AS span, ARRAY[1, NULL, 3] AS nums, \
                 ARRAY['a', 'b'] AS tags, '10.0.0.1'::inet AS addr, NULL::numeric AS missing \
                 FROM (VALUES (1), (2)) t(x)",
                &[],
            )
        })
        .unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    let text = |column: &str| row.get(column).and_then(SqlValue::as_str).unwrap_or_default().to_string();

    assert!(text("mean").starts_with("1.5"), "{:?}", row.get("mean"));
    assert_eq!(text("total"), "3");
    assert_eq!(text("id").len(), 36);
    assert_eq!(text("span"), "1 day 02:00:00");
    assert_eq!(text("nums"), "[1,null,3]");
    assert_eq!(text("tags"), r#"["a","b"]"#);
    assert!(
        matches!(row.get("addr"), Some(SqlValue::Blob(_) | SqlValue::Text(_))),
        "{:?}",
        row.get("addr")
    );
    assert_eq!(row.get("missing"), Some(&SqlValue::Null));
}
