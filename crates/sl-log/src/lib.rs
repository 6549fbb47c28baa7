//! Storage layer for stintlog.
//!
//! Events live in NDJSON files, one JSON object per line, next to a JSON
//! summary sharing the same token (a *file pair*):
//!
//! ```text
//! <log_dir>/<prefix>_20260301_101500.ndjson
//! <summary_dir>/summary_20260301_101500.json
//! ```
//!
//! # Concurrency
//!
//! One [`EventWriter`] per events file, holding an exclusive advisory lock
//! (`fs2`) for as long as it is open. Readers never lock: they read whatever
//! is on disk and ignore a trailing line the writer has not finished yet.
//! Summaries are replaced atomically (temp file + rename), so a reader sees
//! either the previous document or the new one.

mod pair;
mod reader;
mod summary;
mod writer;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use pair::{LogFiles, LogPaths};
pub use reader::{ReadOutcome, parse_events, read_events};
pub use summary::{build_summary, refresh_summary, write_summary};
pub use writer::EventWriter;

/// Storage errors.
#[derive(Debug, Error)]
pub enum LogError {
    /// An I/O operation on a log or summary file failed.
    #[error("failed to {action} {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A document could not be serialized.
    #[error("failed to serialize {what}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// Another writer holds the lock on this events file.
    #[error("{} is locked by another writer", path.display())]
    Locked { path: PathBuf },
}

impl LogError {
    fn io<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_action_and_path() {
        let path = Path::new("/logs/acc_20260301_100000.ndjson");
        let err = LogError::io("read", path)(io::Error::from(io::ErrorKind::PermissionDenied));

        assert_eq!(err.to_string(), "failed to read /logs/acc_20260301_100000.ndjson");
        assert!(std::error::Error::source(&err).is_some());
    }
}
