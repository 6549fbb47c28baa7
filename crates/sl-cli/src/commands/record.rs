//! `record`: snapshots in, event log and summaries out.
//!
//! One task polls the source and runs every snapshot through the detector
//! before taking the next one. Every `session_start` rotates to a fresh file
//! pair; the closing `session_end` of the previous session always lands in
//! the old file because the detector emits it first. The summary scheduler
//! runs alongside and is told about each new pair.
//!
//! A failed append or rotation is logged and the write is retried with the
//! next event; the snapshot stream keeps being consumed.
//!
//! On shutdown (source ended, Ctrl-C or SIGTERM) the open session is closed and the
//! scheduler is stopped. Every pair opened during the run then gets a final
//! summary, and a pair whose summary has no sessions is removed again.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sl_core::{Detector, Event, EventKind, Tick};
use sl_log::{EventWriter, LogFiles, LogPaths, refresh_summary};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::Config;
use crate::scheduler::SummaryScheduler;
use crate::source::{Poll, ReplaySource, SnapshotSource};

/// What a recording produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordStats {
    pub snapshots: u64,
    pub events: u64,
    /// File pairs opened, including any removed again at shutdown.
    pub pairs: u64,
    /// Pairs left on disk, in the order they were opened.
    pub kept: Vec<LogPaths>,
}

/// Runs `record` to completion on its own runtime.
pub fn run(config: &Config, source: &Path, fast: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let stats = runtime.block_on(async {
        let source = ReplaySource::open(source)?;
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("interrupted, shutting down");
            on_interrupt.cancel();
        });
        record(config, source, fast, cancel).await
    })?;

    println!(
        "Recorded {} events from {} snapshots into {} log file(s)",
        stats.events, stats.snapshots, stats.pairs
    );
    for kept in &stats.kept {
        println!("  {} -> {}", kept.events.display(), kept.summary.display());
    }
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where there is one.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}

/// Records from `source` until it ends or `cancel` fires.
pub async fn record<S: SnapshotSource>(
    config: &Config,
    mut source: S,
    fast: bool,
    cancel: CancellationToken,
) -> Result<RecordStats> {
    let files = LogFiles::new(&config.log_dir, &config.summary_dir, &config.out_prefix);
    let (paths_tx, paths_rx) = mpsc::unbounded_channel();
    let scheduler_stop = cancel.child_token();
    let scheduler = SummaryScheduler::new(config.summary_interval(), config.reconstruct_config())
        .spawn(paths_rx, scheduler_stop.clone());

    let mut recorder = Recorder {
        files,
        paths_tx,
        writer: None,
        pending_rotation: None,
        opened: Vec::new(),
        stats: RecordStats::default(),
    };
    let mut detector = Detector::new(config.detector_config());
    let mut clock = Clock::new(fast, config.poll_period());

    tracing::info!(
        hz = config.poll_hz,
        fast,
        log_dir = %config.log_dir.display(),
        "recording"
    );

    let result = poll_loop(&mut source, &mut detector, &mut recorder, &mut clock, config, &cancel).await;

    // Shutdown runs even when the loop failed, so the log is left consistent.
    let closing = detector
        .finish(clock.now())
        .map_or(Ok(()), |end| recorder.write(&[end], &clock));
    scheduler_stop.cancel();
    if let Err(e) = scheduler.await {
        tracing::warn!(error = %e, "summary scheduler task failed");
    }
    let finished = recorder.finish(config);

    result?;
    closing?;
    finished
}

async fn poll_loop<S: SnapshotSource>(
    source: &mut S,
    detector: &mut Detector,
    recorder: &mut Recorder,
    clock: &mut Clock,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<()> {
    let fast = clock.fast;
    let mut ticker = tokio::time::interval(config.poll_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if fast {
            // Unpaced, but still give Ctrl-C a chance between snapshots.
            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                break;
            }
        } else {
            tokio::select! {
                _ = ticker.tick() => {}
                () = cancel.cancelled() => break,
            }
        }

        let poll = source.poll()?;
        let (snapshot, captured_at) = match poll {
            Poll::Ended => {
                tracing::info!("snapshot source ended");
                break;
            }
            Poll::Unavailable => (None, None),
            Poll::Snapshot(snapshot, captured_at) => (Some(snapshot), captured_at),
        };
        let tick = clock.advance(captured_at);
        if snapshot.is_some() {
            recorder.stats.snapshots += 1;
        }
        let events = detector.observe(snapshot.as_ref(), tick);
        if let Err(e) = recorder.write(&events, clock) {
            tracing::warn!(error = %format!("{e:#}"), "failed to write events, retrying with the next event");
        }
    }
    Ok(())
}

/// Where event timestamps come from.
///
/// Paced recording uses the wall clock. Fast replay trusts the capture times
/// recorded with the snapshots and steps by one poll period when a snapshot
/// has none.
#[derive(Debug)]
struct Clock {
    fast: bool,
    period: Duration,
    started: Instant,
    origin: Option<DateTime<Utc>>,
    last: DateTime<Utc>,
}

impl Clock {
    fn new(fast: bool, period: Duration) -> Self {
        Self {
            fast,
            period,
            started: Instant::now(),
            origin: None,
            last: Utc::now(),
        }
    }

    fn advance(&mut self, captured_at: Option<DateTime<Utc>>) -> Tick {
        if !self.fast {
            self.last = Utc::now();
            return Tick {
                at: self.last,
                elapsed: self.started.elapsed(),
            };
        }

        let at = captured_at.unwrap_or_else(|| {
            if self.origin.is_some() {
                self.last + chrono::Duration::from_std(self.period).unwrap_or_default()
            } else {
                self.last
            }
        });
        let origin = *self.origin.get_or_insert(at);
        self.last = at;
        Tick {
            at,
            elapsed: (at - origin).to_std().unwrap_or_default(),
        }
    }

    /// The time of the most recent tick, used to stamp the final `session_end`.
    fn now(&self) -> Tick {
        if self.fast {
            Tick {
                at: self.last,
                elapsed: self
                    .origin
                    .and_then(|origin| (self.last - origin).to_std().ok())
                    .unwrap_or_default(),
            }
        } else {
            Tick {
                at: Utc::now(),
                elapsed: self.started.elapsed(),
            }
        }
    }
}

struct Recorder {
    files: LogFiles,
    paths_tx: mpsc::UnboundedSender<LogPaths>,
    writer: Option<EventWriter>,
    /// Set by a `session_start` until its file pair exists.
    pending_rotation: Option<DateTime<Utc>>,
    /// Every pair opened so far; the last one is being written.
    opened: Vec<LogPaths>,
    stats: RecordStats,
}

impl Recorder {
    /// Appends `events` in order. A failure does not stop the remaining
    /// events; the first error is returned.
    fn write(&mut self, events: &[Event], clock: &Clock) -> Result<()> {
        let mut failure = None;
        for event in events {
            if matches!(event.kind, EventKind::SessionStart { .. }) {
                // Release the lock on the old file before anything else.
                if let Some(done) = self.writer.take() {
                    tracing::debug!(events = done.written(), "closing event log");
                }
                self.pending_rotation = Some(event.ts.unwrap_or(clock.last));
            }
            if let Err(e) = self.append(event) {
                failure.get_or_insert(e);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    fn append(&mut self, event: &Event) -> Result<()> {
        if self.writer.is_none() {
            if let Some(at) = self.pending_rotation {
                self.rotate(at)?;
            } else if let Some(paths) = self.opened.last() {
                tracing::info!(token = %paths.token, "reopening event log");
                self.writer = Some(EventWriter::open(&paths.events)?);
            } else {
                tracing::debug!(kind = %event.kind, "no open log file, dropping event");
                return Ok(());
            }
        }

        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.append(event) {
                // Reopened on the next event.
                self.writer = None;
                return Err(e).with_context(|| format!("dropped {} event", event.kind));
            }
            self.stats.events += 1;
        }
        Ok(())
    }

    fn rotate(&mut self, at: DateTime<Utc>) -> Result<()> {
        let paths = self.files.create(at)?;
        self.pending_rotation = None;
        self.stats.pairs += 1;
        tracing::info!(token = %paths.token, "rotated to new log file pair");
        self.opened.push(paths.clone());
        // The scheduler may already be gone during shutdown.
        let _ = self.paths_tx.send(paths.clone());
        self.writer = Some(EventWriter::open(&paths.events)?);
        Ok(())
    }

    /// Final summary for every pair; drops pairs that hold no session.
    ///
    /// Pairs rotated past faster than the scheduler noticed still end with a
    /// summary covering their whole log.
    fn finish(mut self, config: &Config) -> Result<RecordStats> {
        self.writer = None;
        let reconstruct = config.reconstruct_config();
        for paths in std::mem::take(&mut self.opened) {
            let document = refresh_summary(&paths, &reconstruct, Utc::now())
                .with_context(|| format!("failed to write final summary for {}", paths.token))?;
            if document.has_sessions() {
                tracing::info!(summary = %paths.summary.display(), "final summary written");
                self.stats.kept.push(paths);
            } else {
                tracing::info!(token = %paths.token, "no sessions recorded, removing empty log files");
                self.files.remove_pair(&paths)?;
            }
        }
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Source backed by a fixed list of polls.
    struct Scripted(VecDeque<Poll>);

    impl SnapshotSource for Scripted {
        fn poll(&mut self) -> Result<Poll> {
            Ok(self.0.pop_front().unwrap_or(Poll::Ended))
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::milliseconds(ms)
    }

    fn config(dir: &Path) -> Config {
        Config {
            log_dir: dir.join("logs"),
            summary_dir: dir.join("summaries"),
            wx_every_s: 0.0,
            hb_every_s: 0.0,
            ..Config::default()
        }
    }

    fn on_track(track: &str) -> sl_core::Snapshot {
        sl_core::Snapshot {
            session_type: Some("PRACTICE".into()),
            track: Some(track.into()),
            is_in_pit: Some(false),
            fuel: Some(30.0),
            completed_laps: Some(0),
            ..sl_core::Snapshot::default()
        }
    }

    #[tokio::test]
    async fn test_session_change_rotates_file_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let source = Scripted(VecDeque::from([
            Poll::Snapshot(on_track("monza"), Some(at(0))),
            Poll::Unavailable,
            Poll::Snapshot(on_track("spa"), Some(at(1_000))),
        ]));

        let stats = record(&config, source, true, CancellationToken::new()).await.unwrap();
        assert_eq!(stats.pairs, 2);
        assert_eq!(stats.snapshots, 2);

        let mut logs: Vec<_> = std::fs::read_dir(&config.log_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        logs.sort();
        assert_eq!(logs.len(), 2);

        let first = sl_log::read_events(&logs[0]).unwrap().events;
        let kinds: Vec<_> = first.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, ["session_start", "stint_start", "session_end"]);

        let second = sl_log::read_events(&logs[1]).unwrap().events;
        assert_eq!(second.last().map(|e| &e.kind), Some(&EventKind::SessionEnd));
        assert_eq!(second.last().and_then(|e| e.ts), Some(at(1_000)));

        let tokens: Vec<_> = stats.kept.iter().map(|p| p.token.as_str()).collect();
        assert_eq!(tokens, ["20260301_100000", "20260301_100001"]);

        // The first pair's summary covers its closing session_end.
        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&stats.kept[0].summary).unwrap())
                .unwrap();
        assert_eq!(summary["session"][0]["track"], "monza");
        assert_eq!(summary["session"][0]["time"]["end_local"], "2026-03-01T10:00:01.000Z");
    }

    #[tokio::test]
    async fn test_nothing_recorded_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let source = Scripted(VecDeque::from([Poll::Unavailable, Poll::Unavailable]));

        let stats = record(&config, source, true, CancellationToken::new()).await.unwrap();
        assert_eq!(stats, RecordStats::default());
        assert!(!config.log_dir.exists());
    }

    #[tokio::test]
    async fn test_cancellation_still_closes_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let cancel = CancellationToken::new();

        struct CancelAfterFirst(CancellationToken, bool);
        impl SnapshotSource for CancelAfterFirst {
            fn poll(&mut self) -> Result<Poll> {
                if self.1 {
                    self.0.cancel();
                    return Ok(Poll::Unavailable);
                }
                self.1 = true;
                Ok(Poll::Snapshot(on_track("monza"), Some(at(0))))
            }
        }

        let stats = record(&config, CancelAfterFirst(cancel.clone(), false), true, cancel)
            .await
            .unwrap();
        let events = sl_log::read_events(&stats.kept[0].events).unwrap().events;
        assert_eq!(events.last().map(|e| &e.kind), Some(&EventKind::SessionEnd));
    }

    #[tokio::test]
    async fn test_failed_rotation_is_retried_with_the_next_event() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        // A plain file where the log directory should be makes rotation fail.
        std::fs::write(&config.log_dir, "").unwrap();

        struct RepairAfterFirst {
            blocker: std::path::PathBuf,
            polls: VecDeque<Poll>,
        }
        impl SnapshotSource for RepairAfterFirst {
            fn poll(&mut self) -> Result<Poll> {
                if self.polls.len() == 1 {
                    std::fs::remove_file(&self.blocker)?;
                }
                Ok(self.polls.pop_front().unwrap_or(Poll::Ended))
            }
        }

        let lap_done = sl_core::Snapshot {
            completed_laps: Some(1),
            last_time_ms: Some(95_000.0),
            ..on_track("monza")
        };
        let source = RepairAfterFirst {
            blocker: config.log_dir.clone(),
            polls: VecDeque::from([
                Poll::Snapshot(on_track("monza"), Some(at(0))),
                Poll::Snapshot(lap_done, Some(at(95_000))),
            ]),
        };

        let stats = record(&config, source, true, CancellationToken::new()).await.unwrap();
        assert_eq!(stats.pairs, 1);
        assert_eq!(stats.events, 2);
        assert_eq!(stats.kept.len(), 1);
        assert_eq!(stats.kept[0].token, "20260301_100000");

        let events = sl_log::read_events(&stats.kept[0].events).unwrap().events;
        let kinds: Vec<_> = events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, ["lap_complete", "session_end"]);
    }

    #[test]
    fn test_fast_clock_follows_capture_times() {
        let mut clock = Clock::new(true, Duration::from_millis(200));
        let first = clock.advance(Some(at(5_000)));
        assert_eq!(first.at, at(5_000));
        assert_eq!(first.elapsed, Duration::ZERO);

        let stepped = clock.advance(None);
        assert_eq!(stepped.at, at(5_200));
        assert_eq!(stepped.elapsed, Duration::from_millis(200));

        let jumped = clock.advance(Some(at(9_000)));
        assert_eq!(jumped.elapsed, Duration::from_secs(4));
        assert_eq!(clock.now().at, at(9_000));
    }
}
