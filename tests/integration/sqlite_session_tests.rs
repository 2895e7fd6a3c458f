use datakit::KitError;
use datakit::db::{IsolationLevel, Session, SqlValue, SqliteBackend, SqliteConfig};
use datakit::test_utils::fixtures::LogDirFixture;
use datakit::test_utils::logging::TestLogger;

use super::fixture::{log_lines, open_shared};

const CREATE: &str = "
    CREATE TABLE stations (
        code TEXT PRIMARY KEY,  -- station code
        name TEXT NOT NULL,
        lines INTEGER
    )";

fn db_config(fixture: &LogDirFixture) -> SqliteConfig {
    SqliteConfig::new(fixture.path("data/stations.db"))
}

#[test]
fn migration_job_writes_session_trail_to_run_log() {
    let log = TestLogger::new("migration_job_writes_session_trail_to_run_log");
    let fixture = LogDirFixture::new();
    let run_log = open_shared(&fixture.log_config("job.log"));
    let config = db_config(&fixture);

    log.step("Create the table and load two rows in one transaction");
    run_log.mark_start();
    let loaded = Session::<SqliteBackend>::open(config.clone(), false, Some(run_log.clone()))
        .unwrap()
        .scoped(|session| {
            session.execute_non_query(CREATE, &[])?;
            let mut loaded = 0;
            for (code, name, lines) in [("JY01", "Tokyo", 14), ("JY17", "Shinjuku", 12)] {
                loaded += session.execute_non_query(
                    "INSERT INTO stations (code, name, lines) VALUES (?, ?, ?)",
                    &[code.into(), name.into(), SqlValue::from(lines)],
                )?;
            }
            session.commit()?;
            Ok(loaded)
        })
        .unwrap();
    run_log.mark_end();
    assert_eq!(loaded, 2);

    log.step("Read the rows back");
    let rows = Session::<SqliteBackend>::open(config, false, None)
        .unwrap()
        .scoped(|session| session.execute_query("SELECT code, name FROM stations ORDER BY code", &[]))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("name").and_then(SqlValue::as_str), Some("Shinjuku"));

    let contents = std::fs::read_to_string(run_log.path()).unwrap();
    log.log_file("job.log", &contents);
    assert!(contents.contains("SQLite open session: ["));
    assert!(contents.contains("SQL: [CREATE TABLE stations ( code TEXT PRIMARY KEY, name TEXT NOT NULL, lines INTEGER )]"));
    assert!(contents.contains("params: ['JY17', 'Shinjuku', 12]"));
    assert!(contents.contains("transaction [false] >>> [true]"));
    assert!(contents.contains("transaction [true] >>> [false]"));
    assert!(contents.contains("SQLite close session: ["));

    let lines = log_lines(run_log.path());
    assert!(lines.first().unwrap().contains("processing started"));
    assert!(lines.last().unwrap().contains("processing finished"));

    log.pass();
}

#[test]
fn failed_batch_leaves_no_partial_rows() {
    let fixture = LogDirFixture::new();
    let run_log = open_shared(&fixture.log_config("job.log"));
    let config = db_config(&fixture);

    Session::<SqliteBackend>::open(config.clone(), true, None)
        .unwrap()
        .scoped(|session| session.execute_non_query(CREATE, &[]))
        .unwrap();

    let err = Session::<SqliteBackend>::open(config.clone(), false, Some(run_log.clone()))
        .unwrap()
        .scoped(|session| {
            session.execute_non_query(
                "INSERT INTO stations (code, name) VALUES (?, ?)",
                &["JY01".into(), "Tokyo".into()],
            )?;
            session.execute_non_query(
                "INSERT INTO stations (code, name) VALUES (?, ?)",
                &["JY01".into(), "Tokyo again".into()],
            )?;
            session.commit()
        })
        .unwrap_err();
    assert!(matches!(err, KitError::Query { .. }), "{err:?}");

    let rows = Session::<SqliteBackend>::open(config, false, None)
        .unwrap()
        .scoped(|session| session.execute_query("SELECT * FROM stations", &[]))
        .unwrap();
    assert!(rows.is_empty());

    let contents = std::fs::read_to_string(run_log.path()).unwrap();
    assert!(contents.contains("[ERROR]: failed to execute SQL: [INSERT INTO stations"));
    assert!(contents.contains("SQLite rollback: ["));
}

#[test]
fn operations_on_closed_session_fail() {
    let fixture = LogDirFixture::new();
    let mut session = Session::<SqliteBackend>::new(db_config(&fixture), false, None);
    assert!(!session.is_open());
    assert_eq!(session.status(), None);

    let err = session.execute_query("SELECT 1", &[]).unwrap_err();
    assert!(matches!(err, KitError::Session { source: None, .. }), "{err:?}");

    session.open_session().unwrap();
    session.open_session().unwrap();
    assert_eq!(session.status(), Some(false));
    session.close_session().unwrap();
    session.close_session().unwrap();
    assert!(!session.is_open());
}

#[test]
fn autocommit_isolation_persists_without_commit() {
    let fixture = LogDirFixture::new();
    let config = db_config(&fixture).with_isolation_level(IsolationLevel::Autocommit);

    Session::<SqliteBackend>::open(config.clone(), false, None)
        .unwrap()
        .scoped(|session| {
            session.execute_non_query(CREATE, &[])?;
            session.execute_non_query(
                "INSERT INTO stations (code, name) VALUES ('JY05', 'Akihabara')",
                &[],
            )?;
            assert_eq!(session.status(), Some(false));
            Ok(())
        })
        .unwrap();

    let rows = Session::<SqliteBackend>::open(config, false, None)
        .unwrap()
        .scoped(|session| {
            session.execute_query("SELECT name FROM stations WHERE name REGEXP ?", &["^Aki".into()])
        })
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn debug_lines_respect_log_level() {
    let fixture = LogDirFixture::new();
    let mut config = fixture.log_config("job.log");
    config.level = tracing::level_filters::LevelFilter::INFO;
    let run_log = open_shared(&config);

    Session::<SqliteBackend>::open(SqliteConfig::in_memory(), true, Some(run_log.clone()))
        .unwrap()
        .scoped(|session| session.execute_query("SELECT 1 AS one", &[]))
        .unwrap();

    assert!(log_lines(run_log.path()).is_empty());
}
