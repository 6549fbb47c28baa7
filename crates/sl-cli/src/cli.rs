//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::Config;

/// Sim racing telemetry recorder.
///
/// Turns a stream of telemetry snapshots into an append-only event log and
/// keeps a per-session summary of stints, laps and bests next to it.
#[derive(Debug, Parser)]
#[command(name = "stintlog", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record events from a snapshot source until it ends or Ctrl-C.
    Record(RecordArgs),

    /// Print (or write) the summary of one event log.
    Summarize {
        /// The NDJSON event log.
        log: PathBuf,

        /// Write the summary here instead of printing it.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Regenerate the summary of every event log in a directory.
    Rebuild {
        /// Directory to scan (defaults to the configured log directory).
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Print the parsed events of one log as JSON lines.
    Events {
        /// The NDJSON event log.
        log: PathBuf,

        /// Only print events of this kind (e.g. `lap_complete`).
        #[arg(long)]
        kind: Option<String>,
    },
}

/// Arguments of `record`. Unset flags fall back to the configuration.
#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Recorded snapshots, one JSON object per line.
    #[arg(long)]
    pub source: PathBuf,

    /// Replay as fast as possible, timestamping with the recorded capture times.
    #[arg(long)]
    pub fast: bool,

    /// Polling rate (Hz).
    #[arg(long)]
    pub hz: Option<f64>,

    /// Seconds between forced weather events (0 = off).
    #[arg(long)]
    pub wx_every: Option<f64>,

    /// Seconds between heartbeats (0 = off).
    #[arg(long)]
    pub hb_every: Option<f64>,

    /// Temperature change (°C) that forces a weather event.
    #[arg(long)]
    pub wx_delta: Option<f64>,

    /// Seconds between summary rewrites (minimum 5).
    #[arg(long)]
    pub summary_interval: Option<u64>,

    /// Event log file name prefix.
    #[arg(long)]
    pub out_prefix: Option<String>,

    /// Event log directory.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

impl RecordArgs {
    /// Layers the flags that were given over `config`.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(hz) = self.hz {
            config.poll_hz = hz;
        }
        if let Some(wx_every) = self.wx_every {
            config.wx_every_s = wx_every;
        }
        if let Some(hb_every) = self.hb_every {
            config.hb_every_s = hb_every;
        }
        if let Some(wx_delta) = self.wx_delta {
            config.wx_delta = wx_delta;
        }
        if let Some(interval) = self.summary_interval {
            config.summary_interval_s = interval;
        }
        if let Some(prefix) = &self.out_prefix {
            config.out_prefix.clone_from(prefix);
        }
        if let Some(dir) = &self.out_dir {
            config.log_dir.clone_from(dir);
        }
        config.clamped()
    }
}
