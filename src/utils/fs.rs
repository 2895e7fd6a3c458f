//! Filesystem utilities.
//!
//! Helper functions for file operations.

use std::io;
use std::path::Path;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Split a file name into its stem and extension, the extension keeping its
/// leading dot (`"app.log"` -> `("app", ".log")`).
///
/// Leading-dot names such as `.env` have no extension.
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if file_name[..idx].chars().any(|c| c != '.') => {
            (&file_name[..idx], &file_name[idx..])
        }
        _ => (file_name, ""),
    }
}

/// Size of a file in bytes, or `None` if it does not exist.
pub fn file_size(path: impl AsRef<Path>) -> io::Result<Option<u64>> {
    match std::fs::metadata(path.as_ref()) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
