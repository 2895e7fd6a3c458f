use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone};
use regex::Regex;

use datakit::config::LogConfig;
use datakit::log::Log;

/// Assert that a file contains expected content
#[macro_export]
macro_rules! assert_file_contains {
    ($path:expr, $expected:expr) => {{
        let content = std::fs::read_to_string($path).expect(&format!("Failed to read {:?}", $path));
        assert!(
            content.contains($expected),
            "File {:?} does not contain '{}'\nActual content:\n{}",
            $path,
            $expected,
            &content[..std::cmp::min(content.len(), 2000)]
        );
    }};
}

/// Local midnight on the given day.
pub fn day(y: i32, m: u32, d: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(y, m, d, 0, 0, 0)
        .single()
        .expect("unambiguous local midnight")
}

pub fn open_shared(config: &LogConfig) -> Arc<Log> {
    Arc::new(Log::open(config).expect("Failed to open log"))
}

/// Every non-empty line of a log file.
pub fn log_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("Failed to read log")
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// `{timestamp} {file} {context} [{LEVEL}]: {message}`
pub fn line_shape() -> Regex {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3} \S+ \S+ \[(TRACE|DEBUG|INFO|WARN|ERROR)\]: ")
        .expect("valid regex")
}
