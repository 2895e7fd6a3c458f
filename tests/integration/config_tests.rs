use datakit::KitError;
use datakit::app::AppContext;
use datakit::cli::OutputFormat;
use datakit::config::{BackendKind, Config};
use datakit::db::SqlValue;
use datakit::log::Rotation;
use datakit::test_utils::fixtures::LogDirFixture;

use crate::assert_file_contains;

const JOB_CONFIG: &str = r#"
[log]
file_path = "logs/job.log"
level = "debug"
rotation = "b"
interval = 4096
backup_count = 3

[database]
backend = "sqlite"
auto_commit = true

[database.sqlite]
path = "data/job.db"
isolation_level = "deferred"
"#;

#[test]
fn config_file_drives_log_and_session() {
    let fixture = LogDirFixture::new();
    let path = fixture.write_text("job/datakit.toml", JOB_CONFIG);

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.log.file_path, fixture.path("job/logs/job.log"));
    assert_eq!(config.log.rotation, Some(Rotation::Size));
    assert_eq!(config.database.backend, BackendKind::Sqlite);
    assert_eq!(config.database.sqlite.path, fixture.path("job/data/job.db"));

    let ctx = AppContext::new(config, OutputFormat::Plain).unwrap();
    assert_eq!(ctx.log.path(), fixture.path("job/logs/job.1.log"));

    let mut session = ctx.sqlite_session().unwrap();
    session
        .execute_non_query("CREATE TABLE runs (id INTEGER PRIMARY KEY, note TEXT)", &[])
        .unwrap();
    session
        .execute_non_query("INSERT INTO runs (note) VALUES (?)", &["first".into()])
        .unwrap();
    session.close_session().unwrap();

    let rows = ctx
        .sqlite_session()
        .unwrap()
        .scoped(|s| s.execute_query("SELECT note FROM runs", &[]))
        .unwrap();
    assert_eq!(rows[0].get("note").and_then(SqlValue::as_str), Some("first"));

    assert_file_contains!(ctx.log.path(), "SQLite open session: [");
    assert_file_contains!(ctx.log.path(), "params: ['first']");
}

#[test]
fn invalid_rotation_in_file_is_configuration_error() {
    let fixture = LogDirFixture::new();
    let path = fixture.write_text("datakit.toml", "[log]\nrotation = \"w\"\n");

    let err = Config::from_file(&path).unwrap_err();
    assert!(matches!(err, KitError::Configuration(_)), "{err:?}");
    assert!(err.to_string().contains("unknown rotation 'w'"), "{err}");
}

#[test]
fn missing_explicit_config_is_reported() {
    let fixture = LogDirFixture::new();
    let err = Config::load(Some(&fixture.path("absent.toml"))).unwrap_err();
    assert!(matches!(err, KitError::ConfigNotFound(_)), "{err:?}");
}
