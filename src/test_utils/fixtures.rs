use std::path::PathBuf;

use tempfile::TempDir;
use tracing::level_filters::LevelFilter;

use crate::config::LogConfig;
use crate::log::Rotation;

/// Isolated log directory for rotation and session tests.
pub struct LogDirFixture {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

impl LogDirFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();

        println!("[FIXTURE] Created log directory: {}", root.display());

        Self { temp_dir, root }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write `content` to `name`, creating parent directories.
    pub fn write_text(&self, name: &str, content: &str) -> PathBuf {
        let full_path = self.root.join(name);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&full_path, content).expect("Failed to write file");
        full_path
    }

    /// Write a file of exactly `bytes` bytes.
    pub fn write_sized(&self, name: &str, bytes: usize) -> PathBuf {
        self.write_text(name, &"x".repeat(bytes))
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.root.join(name)).expect("Failed to read file")
    }

    /// Sorted names of the files directly under the fixture root.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.root)
            .expect("Failed to list fixture dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// A debug-level log config writing `name` inside the fixture.
    pub fn log_config(&self, name: &str) -> LogConfig {
        LogConfig {
            file_path: self.root.join(name),
            level: LevelFilter::DEBUG,
            rotation: None,
            interval: None,
            backup_count: 0,
        }
    }

    pub fn rotating_config(
        &self,
        name: &str,
        rotation: Rotation,
        interval: Option<u64>,
        backup_count: usize,
    ) -> LogConfig {
        LogConfig {
            rotation: Some(rotation),
            interval,
            backup_count,
            ..self.log_config(name)
        }
    }
}

impl Default for LogDirFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LogDirFixture {
    fn drop(&mut self) {
        println!("[FIXTURE] Cleaning up log directory: {}", self.root.display());
    }
}
