//! Building and writing summary documents.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use sl_core::event::format_ts;
use sl_core::{ReconstructConfig, SummaryDocument, reconstruct, summarize};

use crate::{LogError, LogPaths, read_events};

/// Re-reads the whole events file and summarizes it.
pub fn build_summary(events: &Path, config: &ReconstructConfig) -> Result<SummaryDocument, LogError> {
    let outcome = read_events(events)?;
    let sessions = reconstruct(&outcome.events, config);
    let file = events
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(summarize(&file, &sessions))
}

/// Stamps `generated_at` and atomically replaces the summary at `path`.
pub fn write_summary(
    path: &Path,
    document: &SummaryDocument,
    now: DateTime<Utc>,
) -> Result<(), LogError> {
    let mut document = document.clone();
    document.generated_at = Some(format_ts(now));

    let content = serde_json::to_string_pretty(&document).map_err(|source| LogError::Json {
        what: "summary",
        source,
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(LogError::io("create directory for", path))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, content).map_err(LogError::io("write", &tmp_path))?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(LogError::io("replace", path)(e));
    }

    tracing::debug!(
        path = %path.display(),
        sessions = document.session.len(),
        stints = document.stints.len(),
        "wrote summary"
    );
    Ok(())
}

/// Rebuilds the summary of a file pair from its events file and writes it.
pub fn refresh_summary(
    paths: &LogPaths,
    config: &ReconstructConfig,
    now: DateTime<Utc>,
) -> Result<SummaryDocument, LogError> {
    let document = build_summary(&paths.events, config)?;
    write_summary(&paths.summary, &document, now)?;
    Ok(document)
}
