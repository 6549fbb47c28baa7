//! Discrete domain events: the only contract between the detector and the
//! reconstructor.
//!
//! On disk every event is one JSON object per line:
//!
//! ```text
//! {"ts":"2026-03-01T10:15:30.250Z","event":"lap_complete","lap":3,"lap_ms":94000,...}
//! ```
//!
//! Unknown values are written as `null`. The reconstructor works from these
//! records alone, so nothing here may depend on detector state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamped event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// When the event was detected, millisecond precision.
    #[serde(
        default,
        with = "ts_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub ts: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Kind-specific payload, tagged by the `event` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    SessionStart {
        session_type: Option<String>,
        track: Option<String>,
        sector_count: Option<i32>,
        car_model: Option<String>,
    },
    SessionEnd,
    StintStart {
        fuel_start: Option<f64>,
        #[serde(default)]
        in_pit_lane: bool,
        completed_lap: Option<i32>,
        car_model: Option<String>,
    },
    StintEnd {
        fuel_end: Option<f64>,
        #[serde(default)]
        in_pit_lane: bool,
    },
    SectorSplit {
        /// 1-based number of the lap the split belongs to.
        lap: Option<i32>,
        /// Index of the sector that just finished.
        sector_index: i32,
        split_ms: i64,
    },
    LapComplete {
        /// 1-based number of the lap that just finished.
        lap: Option<i32>,
        lap_ms: Option<i64>,
        is_valid: Option<bool>,
        fuel_start: Option<f64>,
        fuel_end: Option<f64>,
    },
    #[serde(rename = "wx")]
    Weather(WeatherReport),
    #[serde(rename = "hb")]
    Heartbeat {
        fuel: Option<f64>,
        speed_kmh: Option<f64>,
        is_valid_lap: Option<bool>,
    },
}

/// Payload of a `wx` event.
///
/// BOP and car model ride along because they change rarely and the weather
/// cadence is the natural place to refresh them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub air_temp: Option<f64>,
    pub track_temp: Option<f64>,
    pub grip: Option<String>,
    pub rain_intensity: Option<String>,
    pub cloud_level: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub ballast: Option<i32>,
    pub restrictor: Option<i32>,
    pub car_model: Option<String>,
}

impl EventKind {
    /// Wire name of the kind, as written in the `event` field.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::SessionEnd => "session_end",
            Self::StintStart { .. } => "stint_start",
            Self::StintEnd { .. } => "stint_end",
            Self::SectorSplit { .. } => "sector_split",
            Self::LapComplete { .. } => "lap_complete",
            Self::Weather(_) => "wx",
            Self::Heartbeat { .. } => "hb",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    pub const fn new(ts: DateTime<Utc>, kind: EventKind) -> Self {
        Self { ts: Some(ts), kind }
    }

    /// Serializes the event as a single NDJSON line (without the newline).
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses one NDJSON line.
    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

/// Formats a timestamp the way the log stores it.
#[must_use]
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

mod ts_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    #[expect(clippy::ref_option, reason = "signature required by serde(with)")]
    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_str(&super::format_ts(*ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
