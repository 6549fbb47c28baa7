//! Events/summary file pairs.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sl_core::SummaryDocument;

use crate::{LogError, write_summary};

/// Paths of one file pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    /// Shared by both file names, e.g. `20260301_101500`.
    pub token: String,
    pub events: PathBuf,
    pub summary: PathBuf,
}

impl LogPaths {
    /// Paths for an existing events file. The token is the file stem with
    /// the `<prefix>_` removed when present.
    pub fn for_events_file(events: &Path, summary_dir: &Path, prefix: &str) -> Self {
        let stem = events
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let token = stem
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(&stem)
            .to_string();
        Self {
            summary: summary_path(summary_dir, &token),
            events: events.to_path_buf(),
            token,
        }
    }

    /// File name of the events file, as recorded in its summary.
    pub fn events_file_name(&self) -> String {
        self.events
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn summary_path(summary_dir: &Path, token: &str) -> PathBuf {
    summary_dir.join(format!("summary_{token}.json"))
}

/// Creates and removes file pairs in a log directory.
#[derive(Debug, Clone)]
pub struct LogFiles {
    log_dir: PathBuf,
    summary_dir: PathBuf,
    prefix: String,
}

impl LogFiles {
    pub fn new(log_dir: impl Into<PathBuf>, summary_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            summary_dir: summary_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn summary_dir(&self) -> &Path {
        &self.summary_dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Paths for an events file in any directory, using this prefix.
    pub fn paths_for(&self, events: &Path) -> LogPaths {
        LogPaths::for_events_file(events, &self.summary_dir, &self.prefix)
    }

    /// Creates a new pair stamped with `now`: an empty events file and a
    /// skeleton summary.
    ///
    /// Two pairs created within the same second get `_1`, `_2`, ... appended
    /// to the token instead of overwriting each other.
    pub fn create(&self, now: DateTime<Utc>) -> Result<LogPaths, LogError> {
        fs::create_dir_all(&self.log_dir).map_err(LogError::io("create", &self.log_dir))?;
        fs::create_dir_all(&self.summary_dir).map_err(LogError::io("create", &self.summary_dir))?;

        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let mut attempt = 0u32;
        let paths = loop {
            let token = if attempt == 0 {
                stamp.clone()
            } else {
                format!("{stamp}_{attempt}")
            };
            let events = self.log_dir.join(format!("{}_{token}.ndjson", self.prefix));
            match OpenOptions::new().write(true).create_new(true).open(&events) {
                Ok(_) => {
                    break LogPaths {
                        summary: summary_path(&self.summary_dir, &token),
                        events,
                        token,
                    };
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(LogError::io("create", &events)(e)),
            }
        };

        write_summary(
            &paths.summary,
            &SummaryDocument::empty(paths.events_file_name()),
            now,
        )?;
        tracing::info!(
            events = %paths.events.display(),
            summary = %paths.summary.display(),
            "created log file pair"
        );
        Ok(paths)
    }

    /// Deletes both files of a pair. Files already gone are not an error.
    pub fn remove_pair(&self, paths: &LogPaths) -> Result<(), LogError> {
        for path in [&paths.events, &paths.summary] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(LogError::io("remove", path)(e)),
            }
        }
        tracing::info!(token = %paths.token, "removed empty log file pair");
        Ok(())
    }
}
