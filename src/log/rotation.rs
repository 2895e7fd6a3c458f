//! Rotation policies and rotated-file bookkeeping.
//!
//! A [`LogTarget`] splits the configured log path into directory, stem and
//! extension. Rotated names are always `{stem}{suffix}{ext}` in the same
//! directory, where the suffix is a calendar stamp (`.2024-03-09`) or a
//! sequence number (`.1` = newest).

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local};
use glob::Pattern;
use regex::Regex;

use crate::error::{KitError, Result};
use crate::utils::fs::{file_size, split_extension};

/// How the active log file name is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    /// `y`: `{stem}.YYYY{ext}`
    Yearly,
    /// `m`: `{stem}.YYYY-MM{ext}`
    Monthly,
    /// `d`: `{stem}.YYYY-MM-DD{ext}`
    Daily,
    /// `H`: `{stem}.YYYY-MM-DD_HH{ext}`
    Hourly,
    /// `M`: `{stem}.YYYY-MM-DD_HH-MM{ext}`
    Minutely,
    /// `S`: `{stem}.YYYY-MM-DD_HH-MM-SS{ext}`
    Secondly,
    /// `b`: `{stem}.N{ext}`, renumbered once `.1` outgrows the interval
    Size,
}

impl Rotation {
    pub const ALL: [Self; 7] = [
        Self::Yearly,
        Self::Monthly,
        Self::Daily,
        Self::Hourly,
        Self::Minutely,
        Self::Secondly,
        Self::Size,
    ];

    /// Single-letter code used in configuration files.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Yearly => 'y',
            Self::Monthly => 'm',
            Self::Daily => 'd',
            Self::Hourly => 'H',
            Self::Minutely => 'M',
            Self::Secondly => 'S',
            Self::Size => 'b',
        }
    }

    /// `strftime` pattern of the calendar suffix, `None` for size rotation.
    #[must_use]
    pub const fn date_format(self) -> Option<&'static str> {
        match self {
            Self::Yearly => Some(".%Y"),
            Self::Monthly => Some(".%Y-%m"),
            Self::Daily => Some(".%Y-%m-%d"),
            Self::Hourly => Some(".%Y-%m-%d_%H"),
            Self::Minutely => Some(".%Y-%m-%d_%H-%M"),
            Self::Secondly => Some(".%Y-%m-%d_%H-%M-%S"),
            Self::Size => None,
        }
    }

    const fn suffix_pattern(self) -> &'static str {
        match self {
            Self::Yearly => r"\.[0-9]{4}",
            Self::Monthly => r"\.[0-9]{4}-(?:0[1-9]|1[0-2])",
            Self::Daily => r"\.[0-9]{4}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[12][0-9]|3[01])",
            Self::Hourly => {
                r"\.[0-9]{4}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[12][0-9]|3[01])_(?:[01][0-9]|2[0-3])"
            }
            Self::Minutely => {
                r"\.[0-9]{4}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[12][0-9]|3[01])_(?:[01][0-9]|2[0-3])-[0-5][0-9]"
            }
            Self::Secondly => {
                r"\.[0-9]{4}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[12][0-9]|3[01])_(?:[01][0-9]|2[0-3])-[0-5][0-9]-[0-5][0-9]"
            }
            // Canonical numbers only; `app.01.log` would collide with `app.1.log`.
            Self::Size => r"\.([1-9][0-9]*)",
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Rotation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let code = s.trim();
        Self::ALL
            .into_iter()
            .find(|rotation| code.len() == 1 && code.starts_with(rotation.code()))
            .ok_or_else(|| format!("unknown rotation '{s}' (expected one of y, m, d, H, M, S, b)"))
    }
}

impl<'de> serde::Deserialize<'de> for Rotation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The configured log path, split into the parts rotated names are built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    dir: PathBuf,
    stem: String,
    ext: String,
}

impl LogTarget {
    /// Split an absolute log path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                KitError::Configuration(format!(
                    "log path {} must end in a UTF-8 file name",
                    path.display()
                ))
            })?;
        let (stem, ext) = split_extension(file_name);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self {
            dir,
            stem: stem.to_string(),
            ext: ext.to_string(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The un-rotated path (`{stem}{ext}`).
    #[must_use]
    pub fn base_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}", self.stem, self.ext))
    }

    /// Path of sequence number `n` under size rotation.
    #[must_use]
    pub fn numbered_path(&self, n: u64) -> PathBuf {
        self.dir.join(format!("{}.{n}{}", self.stem, self.ext))
    }

    /// Active path for `rotation` at `now`. Size rotation always writes `.1`.
    #[must_use]
    pub fn effective_path(&self, rotation: Option<Rotation>, now: &DateTime<Local>) -> PathBuf {
        match rotation.and_then(Rotation::date_format) {
            Some(format) => self.dir.join(format!(
                "{}{}{}",
                self.stem,
                now.format(format),
                self.ext
            )),
            None if rotation == Some(Rotation::Size) => self.numbered_path(1),
            None => self.base_path(),
        }
    }

    /// Prepare `.1` for writing: if it exists and is larger than
    /// `max_bytes`, shift every numbered file up by one.
    ///
    /// Returns the path to write to and the number of files renamed.
    pub fn rotate_by_size(&self, max_bytes: u64) -> io::Result<(PathBuf, usize)> {
        let current = self.numbered_path(1);
        let renamed = match file_size(&current)? {
            Some(size) if size > max_bytes => self.shift_numbered()?,
            _ => 0,
        };
        Ok((current, renamed))
    }

    /// Rename every `{stem}.N{ext}` to `{stem}.(N+1){ext}`, highest first so
    /// no rename lands on a file that has not moved yet.
    fn shift_numbered(&self) -> io::Result<usize> {
        let mut numbered = self.numbered_files()?;
        numbered.sort_by(|a, b| b.0.cmp(&a.0));
        for (n, path) in &numbered {
            std::fs::rename(path, self.numbered_path(n + 1))?;
        }
        Ok(numbered.len())
    }

    /// Rotated files belonging to this target under `rotation`, oldest first.
    ///
    /// Calendar stamps sort lexicographically in time order; sequence numbers
    /// grow with age, so size rotation sorts by descending number.
    pub fn rotated_files(&self, rotation: Rotation) -> io::Result<Vec<PathBuf>> {
        if rotation == Rotation::Size {
            let mut numbered = self.numbered_files()?;
            numbered.sort_by(|a, b| b.0.cmp(&a.0));
            return Ok(numbered.into_iter().map(|(_, path)| path).collect());
        }

        let pattern = self.name_regex(rotation)?;
        let mut files: Vec<(String, PathBuf)> = self
            .candidates()?
            .into_iter()
            .filter(|(name, _)| pattern.is_match(name))
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    fn numbered_files(&self) -> io::Result<Vec<(u64, PathBuf)>> {
        let pattern = self.name_regex(Rotation::Size)?;
        Ok(self
            .candidates()?
            .into_iter()
            .filter_map(|(name, path)| {
                let number = pattern.captures(&name)?.get(1)?.as_str().parse().ok()?;
                Some((number, path))
            })
            .collect())
    }

    /// Anchored pattern over the bare file name; the directory never takes
    /// part in matching.
    fn name_regex(&self, rotation: Rotation) -> io::Result<Regex> {
        let source = format!(
            "^{}{}{}$",
            regex::escape(&self.stem),
            rotation.suffix_pattern(),
            regex::escape(&self.ext)
        );
        Regex::new(&source).map_err(io::Error::other)
    }

    /// Files in the log directory whose name starts with the stem.
    fn candidates(&self) -> io::Result<Vec<(String, PathBuf)>> {
        let dir = self.dir.to_str().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("log directory {} is not valid UTF-8", self.dir.display()),
            )
        })?;
        let pattern = format!(
            "{}{}{}*",
            Pattern::escape(dir),
            std::path::MAIN_SEPARATOR,
            Pattern::escape(&self.stem)
        );
        let entries = glob::glob(&pattern).map_err(io::Error::other)?;

        let mut found = Vec::new();
        for entry in entries {
            let path = entry.map_err(glob::GlobError::into_error)?;
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                found.push((name.to_string(), path.clone()));
            }
        }
        Ok(found)
    }
}
