//! Append-only, exclusively locked event writer.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sl_core::Event;

use crate::LogError;

/// Appends events to one NDJSON file.
///
/// Holds an exclusive advisory lock on the file until dropped. Every event is
/// written as one complete line and flushed immediately, so a concurrent
/// reader sees at most one partial trailing line.
#[derive(Debug)]
pub struct EventWriter {
    file: File,
    path: PathBuf,
    written: u64,
}

impl EventWriter {
    /// Opens (creating if needed) `path` for appending and takes the lock.
    pub fn open(path: &Path) -> Result<Self, LogError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(LogError::io("create directory for", path))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(LogError::io("open", path))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(LogError::Locked {
                    path: path.to_path_buf(),
                });
            }
            return Err(LogError::io("lock", path)(e));
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            written: 0,
        })
    }

    /// Number of events appended through this writer.
    pub const fn written(&self) -> u64 {
        self.written
    }

    pub fn append(&mut self, event: &Event) -> Result<(), LogError> {
        let mut line = event.to_json_line().map_err(|source| LogError::Json {
            what: "event",
            source,
        })?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(LogError::io("append to", &self.path))?;
        self.written += 1;
        Ok(())
    }

    pub fn append_all<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> Result<(), LogError> {
        for event in events {
            self.append(event)?;
        }
        Ok(())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(path = %self.path.display(), error = %e, "failed to release log lock");
        }
    }
}
