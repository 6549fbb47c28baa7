//! `events`: dump a log as the reader sees it.
//!
//! Useful for checking what a summary was built from: malformed lines and an
//! unfinished trailing line are dropped exactly as the summarizer drops them.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use sl_core::Event;

/// Prints the events of `log` as JSONL, optionally only those of `kind`.
pub fn run(log: &Path, kind: Option<&str>) -> Result<()> {
    let outcome = sl_log::read_events(log)?;
    if outcome.skipped > 0 || outcome.partial_tail {
        tracing::info!(
            skipped = outcome.skipped,
            partial_tail = outcome.partial_tail,
            "some lines were not events"
        );
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for event in filter(&outcome.events, kind) {
        let line = event.to_json_line().context("failed to serialize event")?;
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn filter<'a>(events: &'a [Event], kind: Option<&'a str>) -> impl Iterator<Item = &'a Event> {
    events
        .iter()
        .filter(move |event| kind.is_none_or(|kind| event.kind.as_str() == kind))
}
