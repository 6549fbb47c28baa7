//! Session reconstruction from an event log.
//!
//! Replays events into a tree of [`Session`] → [`Stint`] → [`Lap`]. The tree
//! is rebuilt from scratch on every pass and is a pure function of the event
//! sequence: reconstructing the same events twice, or feeding them one at a
//! time through [`Reconstructor`] and taking a [`Reconstructor::snapshot`],
//! always yields the same result.
//!
//! The log may be truncated (the recorder is still running, or crashed), so
//! anything still open when the events run out is closed at the last
//! timestamp seen.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Event, EventKind, WeatherReport};
use crate::units::{canonical_ms_int, normalize_category, round1};

/// Default starting fuel (litres) above which a stint is a race run.
pub const DEFAULT_RACE_FUEL_THRESHOLD: f64 = 20.0;

/// Configuration for reconstruction.
#[derive(Debug, Clone)]
pub struct ReconstructConfig {
    /// Stints starting with strictly more fuel than this are [`StintClass::Race`].
    /// Default: 20.0.
    pub race_fuel_threshold: f64,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            race_fuel_threshold: DEFAULT_RACE_FUEL_THRESHOLD,
        }
    }
}

/// Race or qualifying run, fixed when the stint starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StintClass {
    Race,
    Qualy,
}

impl StintClass {
    /// Classifies a stint from its starting fuel. Unknown fuel is `Qualy`.
    #[must_use]
    pub fn from_fuel(fuel_start: Option<f64>, threshold: f64) -> Self {
        if fuel_start.is_some_and(|fuel| fuel > threshold) {
            Self::Race
        } else {
            Self::Qualy
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Race => "race",
            Self::Qualy => "qualy",
        }
    }
}

impl std::fmt::Display for StintClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed lap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lap {
    pub lap: Option<i32>,
    pub lap_ms: Option<i64>,
    pub is_valid: Option<bool>,
    pub fuel_start: Option<f64>,
    pub fuel_end: Option<f64>,
    /// Sector splits recorded while this lap was in progress.
    pub sectors_ms: Vec<i64>,
}

/// A contiguous out-of-pit driving interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stint {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub fuel_start: Option<f64>,
    pub fuel_end: Option<f64>,
    pub class: StintClass,
    pub car_model: Option<String>,
    pub weather_air_start: Option<f64>,
    pub weather_grip_start: Option<String>,
    /// Created for a lap that arrived with no stint to attach to.
    pub synthetic: bool,
    pub laps: Vec<Lap>,
}

impl Stint {
    pub const fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// `end - start`, clamped at zero. `None` unless both ends are known.
    pub fn span(&self) -> Option<Duration> {
        span(self.start, self.end)
    }

    pub fn valid_laps(&self) -> usize {
        self.laps.iter().filter(|l| l.is_valid == Some(true)).count()
    }

    pub fn invalid_laps(&self) -> usize {
        self.laps.iter().filter(|l| l.is_valid == Some(false)).count()
    }

    /// Fastest valid lap with a known time.
    pub fn best_lap_ms(&self) -> Option<i64> {
        self.laps
            .iter()
            .filter(|l| l.is_valid == Some(true))
            .filter_map(|l| l.lap_ms)
            .min()
    }

    fn close(&mut self, fallback: Option<DateTime<Utc>>) {
        close(&mut self.end, fallback);
    }
}

/// A race-weekend segment on one track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub session_type: Option<String>,
    pub track: Option<String>,
    pub sector_count: Option<i32>,
    pub car_model: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub stints: Vec<Stint>,
    pub weather_air: Vec<f64>,
    /// Normalized grip categories, in arrival order.
    pub weather_grip: Vec<String>,
    pub ballast: Option<i32>,
    pub restrictor: Option<i32>,
}

impl Session {
    /// Closes every open stint, then the session itself.
    fn close(&mut self, fallback: Option<DateTime<Utc>>) {
        for stint in &mut self.stints {
            stint.close(fallback);
        }
        close(&mut self.end, fallback);
    }
}

/// Sets `end` to `fallback` unless it is already set.
///
/// The same rule applies whether closing was triggered by an explicit event
/// or by the log running out.
pub fn close(end: &mut Option<DateTime<Utc>>, fallback: Option<DateTime<Utc>>) {
    if end.is_none() {
        *end = fallback;
    }
}

fn span(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<Duration> {
    Some((end? - start?).max(Duration::zero()))
}

/// Weather seen since the session started, used to stamp new stints.
#[derive(Debug, Clone, Default)]
struct WeatherCache {
    air: Option<f64>,
    grip: Option<String>,
}

/// Incremental reconstruction state.
///
/// [`Reconstructor::snapshot`] closes a copy of the open entities, so a live
/// view after `k` events equals [`reconstruct`] over the same `k` events.
#[derive(Debug, Clone, Default)]
pub struct Reconstructor {
    config: ReconstructConfig,
    sessions: Vec<Session>,
    current: Option<Session>,
    /// Sector splits waiting for their `lap_complete`, keyed by lap number.
    pending_splits: BTreeMap<i32, Vec<i64>>,
    weather: WeatherCache,
    last_ts: Option<DateTime<Utc>>,
}

impl Reconstructor {
    pub fn new(config: ReconstructConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Applies one event.
    pub fn feed(&mut self, event: &Event) {
        if event.ts.is_some() {
            self.last_ts = event.ts;
        }
        let ts = event.ts;
        let fallback = ts.or(self.last_ts);

        match &event.kind {
            EventKind::SessionStart {
                session_type,
                track,
                sector_count,
                car_model,
            } => {
                self.close_current(fallback);
                self.current = Some(Session {
                    session_type: session_type.clone(),
                    track: track.clone(),
                    sector_count: *sector_count,
                    car_model: car_model.clone(),
                    start: ts,
                    end: None,
                    stints: Vec::new(),
                    weather_air: Vec::new(),
                    weather_grip: Vec::new(),
                    ballast: None,
                    restrictor: None,
                });
                self.pending_splits.clear();
                self.weather = WeatherCache::default();
                return;
            }
            EventKind::SessionEnd => {
                self.close_current(fallback);
                self.pending_splits.clear();
                return;
            }
            _ => {}
        }

        // Anything before the first session_start has nowhere to go.
        let Some(session) = self.current.as_mut() else {
            tracing::trace!(kind = %event.kind, "event outside any session, ignored");
            return;
        };

        match &event.kind {
            EventKind::StintStart {
                fuel_start,
                car_model,
                ..
            } => {
                let fuel_start = round1(*fuel_start);
                // Keep at most one open stint per session.
                if let Some(previous) = session.stints.last_mut() {
                    previous.close(fallback);
                }
                session.stints.push(Stint {
                    start: ts,
                    end: None,
                    fuel_start,
                    fuel_end: None,
                    class: StintClass::from_fuel(fuel_start, self.config.race_fuel_threshold),
                    car_model: car_model.clone().or_else(|| session.car_model.clone()),
                    weather_air_start: self.weather.air,
                    weather_grip_start: self.weather.grip.clone(),
                    synthetic: false,
                    laps: Vec::new(),
                });
                if car_model.is_some() {
                    session.car_model.clone_from(car_model);
                }
            }
            EventKind::StintEnd { fuel_end, .. } => {
                if let Some(stint) = session.stints.last_mut().filter(|s| s.is_open()) {
                    stint.end = fallback;
                    stint.fuel_end = round1(*fuel_end);
                }
            }
            EventKind::SectorSplit { lap, split_ms, .. } => {
                if let Some(lap) = lap {
                    self.pending_splits.entry(*lap).or_default().push(*split_ms);
                }
            }
            EventKind::LapComplete {
                lap,
                lap_ms,
                is_valid,
                fuel_start,
                fuel_end,
            } => {
                if session.stints.is_empty() {
                    tracing::debug!(?lap, "lap without a stint, starting a synthetic one");
                    session.stints.push(Stint {
                        start: ts,
                        end: None,
                        fuel_start: None,
                        fuel_end: None,
                        class: StintClass::from_fuel(None, self.config.race_fuel_threshold),
                        car_model: None,
                        weather_air_start: None,
                        weather_grip_start: None,
                        synthetic: true,
                        laps: Vec::new(),
                    });
                }
                let sectors_ms = lap
                    .and_then(|n| self.pending_splits.remove(&n))
                    .unwrap_or_default();
                if let Some(stint) = session.stints.last_mut() {
                    stint.laps.push(Lap {
                        lap: *lap,
                        lap_ms: lap_ms.and_then(canonical_ms_int),
                        is_valid: *is_valid,
                        fuel_start: round1(*fuel_start),
                        fuel_end: round1(*fuel_end),
                        sectors_ms,
                    });
                }
            }
            EventKind::Weather(report) => apply_weather(session, &mut self.weather, report),
            EventKind::Heartbeat { .. }
            | EventKind::SessionStart { .. }
            | EventKind::SessionEnd => {}
        }
    }

    /// The sessions so far, with everything open closed at the last
    /// timestamp seen. Does not disturb further feeding.
    pub fn snapshot(&self) -> Vec<Session> {
        self.clone().finish()
    }

    /// Ends the log: closes whatever is open and returns all sessions.
    pub fn finish(mut self) -> Vec<Session> {
        self.close_current(self.last_ts);
        self.sessions
    }

    fn close_current(&mut self, fallback: Option<DateTime<Utc>>) {
        if let Some(mut session) = self.current.take() {
            session.close(fallback);
            self.sessions.push(session);
        }
    }
}

fn apply_weather(session: &mut Session, cache: &mut WeatherCache, report: &WeatherReport) {
    let grip = report.grip.as_deref().and_then(normalize_category);

    if let Some(air) = report.air_temp {
        session.weather_air.push(air);
        cache.air = Some(air);
    }
    if report.grip.is_some() {
        if let Some(grip) = &grip {
            session.weather_grip.push(grip.clone());
        }
        cache.grip.clone_from(&grip);
    }
    if report.ballast.is_some() {
        session.ballast = report.ballast;
    }
    if report.restrictor.is_some() {
        session.restrictor = report.restrictor;
    }
    if report.car_model.is_some() {
        session.car_model.clone_from(&report.car_model);
    }

    if let Some(stint) = session.stints.last_mut().filter(|s| s.is_open()) {
        if stint.weather_air_start.is_none() {
            stint.weather_air_start = report.air_temp;
        }
        if stint.weather_grip_start.is_none() {
            stint.weather_grip_start = grip;
        }
    }
}

/// Reconstructs the full session tree from an event sequence.
pub fn reconstruct<'a, I>(events: I, config: &ReconstructConfig) -> Vec<Session>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut reconstructor = Reconstructor::new(config.clone());
    for event in events {
        reconstructor.feed(event);
    }
    reconstructor.finish()
}
