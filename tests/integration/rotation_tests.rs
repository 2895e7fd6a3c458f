use datakit::KitError;
use datakit::log::{Log, Rotation};
use datakit::test_utils::fixtures::LogDirFixture;
use datakit::test_utils::logging::TestLogger;

use super::fixture::{day, line_shape, log_lines};
use crate::assert_file_contains;

#[test]
fn daily_job_keeps_the_newest_backups() {
    let log = TestLogger::new("daily_job_keeps_the_newest_backups");
    let fixture = LogDirFixture::new();
    let config = fixture.rotating_config("job.log", Rotation::Daily, None, 2);

    log.step("Run the job on four consecutive days");
    for d in 1..=4 {
        let run = Log::open_at(&config, day(2024, 3, d)).unwrap();
        run.mark_start();
        run.info(format!("loaded day {d}"));
        run.mark_end();
    }

    let names = fixture.file_names();
    log.log_input("files", &names);
    assert_eq!(names, ["job.2024-03-03.log", "job.2024-03-04.log"]);
    assert_file_contains!(fixture.path("job.2024-03-04.log"), "loaded day 4");

    log.pass();
}

#[test]
fn same_day_reruns_append_to_one_file() {
    let fixture = LogDirFixture::new();
    let config = fixture.rotating_config("job.log", Rotation::Daily, None, 0);

    for attempt in 1..=3 {
        let run = Log::open_at(&config, day(2024, 3, 9)).unwrap();
        run.info(format!("attempt {attempt}"));
    }

    assert_eq!(fixture.file_names(), ["job.2024-03-09.log"]);
    let lines = log_lines(&fixture.path("job.2024-03-09.log"));
    assert_eq!(lines.len(), 3);
    assert!(lines[2].ends_with("attempt 3"));
}

#[test]
fn size_rotation_shifts_and_prunes() {
    let log = TestLogger::new("size_rotation_shifts_and_prunes");
    let fixture = LogDirFixture::new();
    let config = fixture.rotating_config("job.log", Rotation::Size, Some(100), 2);

    for run in 1..=3 {
        log.step(&format!("Run {run}"));
        let opened = Log::open(&config).unwrap();
        assert_eq!(opened.path(), fixture.path("job.1.log"));
        opened.info(format!("run {run} {}", "x".repeat(120)));
    }

    let names = fixture.file_names();
    log.log_input("files", &names);
    assert_eq!(names, ["job.1.log", "job.2.log"]);
    assert_file_contains!(fixture.path("job.1.log"), "run 3");
    assert_file_contains!(fixture.path("job.2.log"), "run 2");
    assert_file_contains!(fixture.path("job.1.log"), "rotated 2 log file(s)");

    log.pass();
}

#[test]
fn small_size_log_is_reused() {
    let fixture = LogDirFixture::new();
    let config = fixture.rotating_config("job.log", Rotation::Size, Some(10_000), 3);

    Log::open(&config).unwrap().info("first");
    Log::open(&config).unwrap().info("second");

    assert_eq!(fixture.file_names(), ["job.1.log"]);
    assert_eq!(log_lines(&fixture.path("job.1.log")).len(), 2);
}

#[test]
fn pruning_ignores_unrelated_files() {
    let fixture = LogDirFixture::new();
    fixture.write_text("job.2024-02-01.log", "old\n");
    fixture.write_text("job.log.bak", "keep\n");
    fixture.write_text("other.2023-01-01.log", "keep\n");
    fixture.write_text("job.2024-13-01.log", "not a date\n");
    let config = fixture.rotating_config("job.log", Rotation::Daily, None, 1);

    let run = Log::open_at(&config, day(2024, 3, 9)).unwrap();
    assert_eq!(run.rotated_files().unwrap(), [fixture.path("job.2024-03-09.log")]);

    assert_eq!(
        fixture.file_names(),
        [
            "job.2024-03-09.log",
            "job.2024-13-01.log",
            "job.log.bak",
            "other.2023-01-01.log",
        ]
    );
}

#[test]
fn size_rotation_without_interval_is_rejected() {
    let fixture = LogDirFixture::new();
    let config = fixture.rotating_config("job.log", Rotation::Size, None, 2);

    let err = Log::open(&config).unwrap_err();
    assert!(matches!(err, KitError::Configuration(_)), "{err:?}");
    assert!(fixture.file_names().is_empty());
}

#[test]
fn every_line_has_the_standard_shape() {
    let fixture = LogDirFixture::new();
    let run = Log::open(&fixture.log_config("nested/dir/job.log")).unwrap();
    run.mark_start();
    run.debug("debug line");
    run.warn("warn line");
    run.mark_end();

    let shape = line_shape();
    let lines = log_lines(&fixture.path("nested/dir/job.log"));
    assert_eq!(lines.len(), 4);
    for line in &lines {
        assert!(shape.is_match(line), "unexpected line: {line}");
    }
    assert!(lines[0].contains("processing started"));
    assert!(lines[3].contains("processing finished"));
}
