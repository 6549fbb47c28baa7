//! Periodic summary rewriting.
//!
//! The scheduler runs as its own tokio task next to the recorder. The
//! recorder sends every file pair it opens over a channel; every interval the
//! scheduler re-reads the newest pair's events file from the start on a
//! blocking thread and atomically rewrites its summary. Each pair it is moved
//! off gets one last rewrite so its summary covers the closing `session_end`.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sl_core::{ReconstructConfig, SummaryDocument};
use sl_log::{LogPaths, refresh_summary};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SummaryScheduler {
    interval: Duration,
    config: ReconstructConfig,
}

impl SummaryScheduler {
    pub const fn new(interval: Duration, config: ReconstructConfig) -> Self {
        Self { interval, config }
    }

    /// Starts the loop. It stops once `cancel` fires; a rewrite already in
    /// progress finishes first, and rotations already sent are still flushed.
    pub fn spawn(
        self,
        paths: mpsc::UnboundedReceiver<LogPaths>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(paths, cancel))
    }

    async fn run(self, mut paths: mpsc::UnboundedReceiver<LogPaths>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut current: Option<LogPaths> = None;
        let mut attached = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(pair) = &current {
                        self.flush_logged(pair.clone()).await;
                    }
                }
                next = paths.recv(), if attached => {
                    match next {
                        Some(next) => self.rotate(&mut current, next).await,
                        // Recorder gone; keep the last pair until cancelled.
                        None => attached = false,
                    }
                }
                () = cancel.cancelled() => {
                    while let Ok(next) = paths.try_recv() {
                        self.rotate(&mut current, next).await;
                    }
                    tracing::debug!("summary scheduler stopping");
                    break;
                }
            }
        }
    }

    async fn rotate(&self, current: &mut Option<LogPaths>, next: LogPaths) {
        if current.as_ref() == Some(&next) {
            return;
        }
        if let Some(previous) = current.replace(next) {
            tracing::info!(token = %previous.token, "log rotated, flushing previous summary");
            self.flush_logged(previous).await;
        }
    }

    async fn flush_logged(&self, paths: LogPaths) {
        match self.flush(paths).await {
            Ok(document) => tracing::debug!(
                file = %document.file,
                sessions = document.session.len(),
                stints = document.stints.len(),
                "summary refreshed"
            ),
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "summary refresh failed, retrying next cycle"),
        }
    }

    /// Rebuilds and writes the summary of `paths` right now.
    pub async fn flush(&self, paths: LogPaths) -> Result<SummaryDocument> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || refresh_summary(&paths, &config, Utc::now()))
            .await
            .context("summary task panicked")?
            .context("failed to refresh summary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_core::{Event, EventKind};
    use sl_log::{EventWriter, LogFiles};

    fn session(files: &LogFiles, secs: i64, track: &str) -> LogPaths {
        let at = chrono::DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::seconds(secs);
        let paths = files.create(at).unwrap();
        let mut writer = EventWriter::open(&paths.events).unwrap();
        writer
            .append(&Event::new(
                at,
                EventKind::SessionStart {
                    session_type: Some("PRACTICE".into()),
                    track: Some(track.into()),
                    sector_count: Some(3),
                    car_model: None,
                },
            ))
            .unwrap();
        paths
    }

    fn sessions_in(paths: &LogPaths) -> usize {
        let doc: SummaryDocument =
            serde_json::from_str(&std::fs::read_to_string(&paths.summary).unwrap()).unwrap();
        doc.session.len()
    }

    #[tokio::test]
    async fn test_rewrites_on_every_interval() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::new(dir.path(), dir.path(), "acc");
        let pair = session(&files, 0, "monza");

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(pair.clone()).unwrap();
        let cancel = CancellationToken::new();
        let handle = SummaryScheduler::new(Duration::from_millis(50), ReconstructConfig::default())
            .spawn(rx, cancel.clone());

        assert_eq!(sessions_in(&pair), 0);
        wait_for(|| sessions_in(&pair) == 1).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_rotation_flushes_the_previous_pair() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::new(dir.path(), dir.path(), "acc");
        let first = session(&files, 0, "monza");
        let second = session(&files, 60, "spa");

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(first.clone()).unwrap();
        let cancel = CancellationToken::new();
        let handle = SummaryScheduler::new(Duration::from_secs(3600), ReconstructConfig::default())
            .spawn(rx, cancel.clone());

        tx.send(second.clone()).unwrap();
        wait_for(|| sessions_in(&first) == 1).await;
        assert_eq!(sessions_in(&second), 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_rotations_sent_before_start_are_all_flushed() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::new(dir.path(), dir.path(), "acc");
        let first = session(&files, 0, "monza");
        let second = session(&files, 60, "spa");
        let third = session(&files, 120, "imola");

        let (tx, rx) = mpsc::unbounded_channel();
        for pair in [&first, &second, &third] {
            tx.send(pair.clone()).unwrap();
        }
        let cancel = CancellationToken::new();
        let handle = SummaryScheduler::new(Duration::from_secs(3600), ReconstructConfig::default())
            .spawn(rx, cancel.clone());

        wait_for(|| sessions_in(&first) == 1 && sessions_in(&second) == 1).await;
        assert_eq!(sessions_in(&third), 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_still_flushes_pending_rotations() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::new(dir.path(), dir.path(), "acc");
        let first = session(&files, 0, "monza");
        let second = session(&files, 60, "spa");

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(first.clone()).unwrap();
        tx.send(second.clone()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        SummaryScheduler::new(Duration::from_secs(3600), ReconstructConfig::default())
            .spawn(rx, cancel)
            .await
            .unwrap();

        assert_eq!(sessions_in(&first), 1);
    }

    #[tokio::test]
    async fn test_flush_reports_storage_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "").unwrap();
        let paths = LogPaths {
            token: "t".into(),
            events: dir.path().join("acc_t.ndjson"),
            summary: blocker.join("summary_t.json"),
        };

        let scheduler = SummaryScheduler::new(Duration::from_secs(5), ReconstructConfig::default());
        let err = scheduler.flush(paths).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to refresh summary"));
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..500 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }
}
