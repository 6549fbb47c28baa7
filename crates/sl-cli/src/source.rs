//! Snapshot sources.
//!
//! The live simulation is read through its shared memory, which lives outside
//! this tool. [`ReplaySource`] plays back snapshots recorded as JSON lines:
//!
//! ```text
//! {"captured_at":"2026-03-01T10:00:00.200Z","session_type":"PRACTICE","track":"monza","fuel":30.0}
//! null
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sl_core::Snapshot;

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum Poll {
    /// A reading, with the time it was captured if the source knows it.
    Snapshot(Snapshot, Option<DateTime<Utc>>),
    /// Nothing to read this tick (menus, loading, a garbled frame).
    Unavailable,
    /// The source is exhausted.
    Ended,
}

/// Anything that yields telemetry snapshots.
///
/// Returns:
/// - `Ok(Poll::Snapshot(..))` - New reading available
/// - `Ok(Poll::Unavailable)` - No reading this tick; try again next tick
/// - `Ok(Poll::Ended)` - Source finished (normal termination)
/// - `Err(e)` - The source itself failed
pub trait SnapshotSource {
    fn poll(&mut self) -> Result<Poll>;
}

#[derive(Deserialize)]
struct ReplayLine {
    #[serde(default)]
    captured_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    snapshot: Snapshot,
}

/// Replays snapshots from a JSON-lines file.
#[derive(Debug)]
pub struct ReplaySource<R> {
    reader: R,
    line_num: usize,
    buf: Vec<u8>,
}

impl ReplaySource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open snapshot source: {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> ReplaySource<R> {
    pub const fn new(reader: R) -> Self {
        Self {
            reader,
            line_num: 0,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> SnapshotSource for ReplaySource<R> {
    fn poll(&mut self) -> Result<Poll> {
        self.buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .context("failed to read snapshot source")?;
        if read == 0 {
            return Ok(Poll::Ended);
        }
        self.line_num += 1;

        let line = match std::str::from_utf8(&self.buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                tracing::warn!(line = self.line_num, error = %e, "skipping snapshot that is not UTF-8");
                return Ok(Poll::Unavailable);
            }
        };
        if line.is_empty() {
            return Ok(Poll::Unavailable);
        }
        match serde_json::from_str::<Option<ReplayLine>>(line) {
            Ok(Some(entry)) => Ok(Poll::Snapshot(entry.snapshot, entry.captured_at)),
            Ok(None) => Ok(Poll::Unavailable),
            Err(e) => {
                tracing::warn!(line = self.line_num, error = %e, "skipping malformed snapshot");
                Ok(Poll::Unavailable)
            }
        }
    }
}
