//! `rebuild`: regenerate every summary from its event log.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rayon::prelude::*;
use sl_core::ReconstructConfig;
use sl_log::{LogFiles, refresh_summary};

/// Outcome of one rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub rebuilt: usize,
    pub failed: Vec<PathBuf>,
}

pub fn run(files: &LogFiles, dir: Option<&Path>, config: &ReconstructConfig) -> Result<()> {
    let dir = dir.unwrap_or_else(|| files.log_dir());
    let report = rebuild(files, dir, config)?;

    println!(
        "Rebuilt {} summaries in {}",
        report.rebuilt,
        files.summary_dir().display()
    );
    if !report.failed.is_empty() {
        for path in &report.failed {
            eprintln!("  failed: {}", path.display());
        }
        bail!("{} event log(s) could not be summarized", report.failed.len());
    }
    Ok(())
}

/// Rewrites the summary of every `*.ndjson` file in `dir`, in parallel.
pub fn rebuild(files: &LogFiles, dir: &Path, config: &ReconstructConfig) -> Result<RebuildReport> {
    let logs = event_logs(dir)?;
    tracing::debug!(dir = %dir.display(), logs = logs.len(), "rebuilding summaries");

    let now = Utc::now();
    let mut failed: Vec<PathBuf> = logs
        .par_iter()
        .filter_map(|log| {
            let paths = files.paths_for(log);
            match refresh_summary(&paths, config, now) {
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(path = ?log, error = %e, "failed to rebuild summary");
                    Some(log.clone())
                }
            }
        })
        .collect();
    failed.sort();

    Ok(RebuildReport {
        rebuilt: logs.len() - failed.len(),
        failed,
    })
}

fn event_logs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    let mut logs = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to list {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "ndjson") {
            logs.push(path);
        }
    }
    logs.sort();
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_core::{Event, EventKind};
    use sl_log::EventWriter;

    #[test]
    fn test_rebuilds_every_log_in_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::new(dir.path().join("logs"), dir.path().join("summaries"), "acc");
        fs::create_dir_all(files.log_dir()).unwrap();

        let at = chrono::DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let log = files.log_dir().join("acc_20260301_100000.ndjson");
        let mut writer = EventWriter::open(&log).unwrap();
        writer
            .append(&Event::new(
                at,
                EventKind::SessionStart {
                    session_type: Some("RACE".into()),
                    track: Some("spa".into()),
                    sector_count: Some(3),
                    car_model: None,
                },
            ))
            .unwrap();
        drop(writer);
        fs::write(files.log_dir().join("acc_20260301_110000.ndjson"), "garbage\n").unwrap();
        fs::write(files.log_dir().join("notes.txt"), "ignored").unwrap();

        let report = rebuild(&files, files.log_dir(), &ReconstructConfig::default()).unwrap();
        assert_eq!(report, RebuildReport { rebuilt: 2, failed: Vec::new() });

        let summary = files.summary_dir().join("summary_20260301_100000.json");
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(summary).unwrap()).unwrap();
        assert_eq!(value["session"][0]["track"], "spa");
        assert!(files.summary_dir().join("summary_20260301_110000.json").exists());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::new(dir.path(), dir.path(), "acc");
        let err = rebuild(&files, &dir.path().join("absent"), &ReconstructConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("failed to list"));
    }
}
