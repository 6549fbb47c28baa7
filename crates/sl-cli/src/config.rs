//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use sl_core::{DetectorConfig, ReconstructConfig};

/// Slowest accepted polling rate.
pub const MIN_POLL_HZ: f64 = 0.1;

/// Shortest accepted summary refresh interval.
pub const MIN_SUMMARY_INTERVAL_S: u64 = 5;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for NDJSON event logs.
    pub log_dir: PathBuf,
    /// Directory for JSON summaries.
    pub summary_dir: PathBuf,
    /// File name prefix of event logs.
    pub out_prefix: String,
    /// Snapshot polling rate.
    pub poll_hz: f64,
    /// Seconds between forced weather events; 0 disables them.
    pub wx_every_s: f64,
    /// Temperature change (°C) that forces a weather event.
    pub wx_delta: f64,
    /// Seconds between heartbeats; 0 disables them.
    pub hb_every_s: f64,
    /// Seconds between periodic summary rewrites.
    pub summary_interval_s: u64,
    /// Starting fuel above which a stint counts as a race run.
    pub race_fuel_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            log_dir: data_dir.join("logs"),
            summary_dir: data_dir.join("summaries"),
            out_prefix: "acc".to_string(),
            poll_hz: 5.0,
            wx_every_s: 2.0,
            wx_delta: 0.5,
            hb_every_s: 0.5,
            summary_interval_s: 10,
            race_fuel_threshold: sl_core::reconstruct::DEFAULT_RACE_FUEL_THRESHOLD,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("STINTLOG_"));

        figment.extract::<Self>().map(Self::clamped)
    }

    /// Applies the lower bounds on polling and summary intervals.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        if !self.poll_hz.is_finite() || self.poll_hz < MIN_POLL_HZ {
            self.poll_hz = MIN_POLL_HZ;
        }
        self.summary_interval_s = self.summary_interval_s.max(MIN_SUMMARY_INTERVAL_S);
        self
    }

    pub fn poll_period(&self) -> Duration {
        seconds(1.0 / self.poll_hz)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_s)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            weather_interval: seconds(self.wx_every_s),
            weather_delta: self.wx_delta,
            heartbeat_interval: seconds(self.hb_every_s),
        }
    }

    pub fn reconstruct_config(&self) -> ReconstructConfig {
        ReconstructConfig {
            race_fuel_threshold: self.race_fuel_threshold,
        }
    }
}

/// Negative or non-finite values mean "off".
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Returns the platform-specific config directory for stintlog.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stintlog"))
}

/// Returns the platform-specific data directory for stintlog.
///
/// On Linux: `~/.local/share/stintlog`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("stintlog"))
}
