//! `summarize`: the summary of one event log, on demand.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sl_core::{ReconstructConfig, SummaryDocument};
use sl_log::{build_summary, write_summary};

/// Prints the summary of `log`, or writes it to `out`.
pub fn run(log: &Path, out: Option<&Path>, config: &ReconstructConfig) -> Result<()> {
    let document = build_summary(log, config)
        .with_context(|| format!("failed to summarize {}", log.display()))?;

    match out {
        Some(out) => {
            write_summary(out, &document, Utc::now())?;
            println!(
                "Wrote {} session(s), {} stint(s) to {}",
                document.session.len(),
                document.stints.len(),
                out.display()
            );
        }
        None => println!("{}", render(document, Utc::now())?),
    }
    Ok(())
}

/// Pretty JSON, stamped the same way a written summary is.
fn render(mut document: SummaryDocument, now: DateTime<Utc>) -> Result<String> {
    document.generated_at = Some(sl_core::event::format_ts(now));
    serde_json::to_string_pretty(&document).context("failed to serialize summary")
}
