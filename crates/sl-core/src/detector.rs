//! Event detection from successive telemetry snapshots.
//!
//! # Algorithm Summary
//!
//! Each tick runs the same rules in a fixed order against the rolling
//! [`DetectorState`]:
//!
//! 1. Session boundary: `(session_type, track)` changed
//! 2. Pit transition: pit box or pit lane entered/left
//! 3. Lap validity: AND every observed flag into the lap accumulator
//! 4. Sector split: sector index moved 0→1 or 1→2
//! 5. Lap completion: completed-lap counter increased
//! 6. Weather: changed beyond a threshold, or the interval elapsed
//! 7. Heartbeat: the interval elapsed
//!
//! [`step`] is a plain function of `(config, state, snapshot, tick)` so every
//! rule can be exercised without a running source.

use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};

use crate::event::{Event, EventKind, WeatherReport};
use crate::snapshot::Snapshot;
use crate::units::{canonical_ms, clean_str, round1};

/// Configuration for event detection.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Maximum time between two `wx` events. Zero disables weather events.
    /// Default: 2s.
    pub weather_interval: Duration,

    /// Air or track temperature change (°C) that forces a `wx` event.
    /// Default: 0.5.
    pub weather_delta: f64,

    /// Time between two `hb` events. Zero disables heartbeats.
    /// Default: 500ms.
    pub heartbeat_interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            weather_interval: Duration::from_secs(2),
            weather_delta: 0.5,
            heartbeat_interval: Duration::from_millis(500),
        }
    }
}

/// When a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Wall-clock time, used for event timestamps.
    pub at: DateTime<Utc>,
    /// Monotonic time since the source started, used for throttling.
    pub elapsed: Duration,
}

/// Last weather values a `wx` event was emitted for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherValues {
    pub air_temp: Option<f64>,
    pub track_temp: Option<f64>,
    pub grip: Option<String>,
    pub rain_intensity: Option<String>,
    pub cloud_level: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
}

/// Rolling state carried from one tick to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorState {
    /// `(session_type, track)` of the previous tick.
    pub session_key: Option<(Option<String>, Option<String>)>,
    pub session_open: bool,

    /// Pit-effective flag of the previous tick; `None` until first observed
    /// in the current session.
    pub in_pit: Option<bool>,
    pub sector_index: Option<i32>,
    pub completed_laps: Option<i32>,
    /// AND of every validity flag seen during the lap in progress.
    pub lap_valid: Option<bool>,
    pub lap_start_fuel: Option<f64>,

    /// Last known car identity and BOP; the source reports them sporadically.
    pub car_model: Option<String>,
    pub ballast: Option<i32>,
    pub restrictor: Option<i32>,

    pub last_weather_at: Option<Duration>,
    pub last_weather: WeatherValues,
    pub last_heartbeat_at: Option<Duration>,
}

impl DetectorState {
    fn reset_session(&mut self) {
        self.in_pit = None;
        self.sector_index = None;
        self.completed_laps = None;
        self.lap_valid = None;
        self.lap_start_fuel = None;
    }

    fn begin_stint(&mut self, completed: Option<i32>, fuel: Option<f64>, sector: Option<i32>) {
        self.completed_laps = completed;
        self.lap_valid = None;
        self.lap_start_fuel = fuel;
        self.sector_index = sector;
    }
}

/// Owns the configuration and rolling state for one snapshot source.
#[derive(Debug, Clone, Default)]
pub struct Detector {
    config: DetectorConfig,
    state: DetectorState,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::default(),
        }
    }

    /// Processes one poll result. An unavailable snapshot (`None`) is
    /// skipped and leaves the state untouched.
    pub fn observe(&mut self, snapshot: Option<&Snapshot>, tick: Tick) -> Vec<Event> {
        match snapshot {
            Some(snapshot) => step(&self.config, &mut self.state, snapshot, tick),
            None => Vec::new(),
        }
    }

    /// Closes the open session, if any. Used when the source stops.
    pub fn finish(&mut self, tick: Tick) -> Option<Event> {
        if !self.state.session_open {
            return None;
        }
        self.state.session_open = false;
        self.state.session_key = None;
        self.state.reset_session();
        Some(Event::new(tick.at.trunc_subsecs(3), EventKind::SessionEnd))
    }

    pub const fn state(&self) -> &DetectorState {
        &self.state
    }
}

/// Runs every detection rule for one snapshot and returns the events in
/// emission order.
#[expect(clippy::too_many_lines, reason = "rules run in a fixed order over shared state")]
pub fn step(
    config: &DetectorConfig,
    state: &mut DetectorState,
    snapshot: &Snapshot,
    tick: Tick,
) -> Vec<Event> {
    // Events must read back from the log exactly as emitted.
    let at = tick.at.trunc_subsecs(3);
    let mut events = Vec::new();

    let session_type = clean_str(snapshot.session_type.as_deref());
    let track = clean_str(snapshot.track.as_deref());
    if let Some(model) = clean_str(snapshot.car_model.as_deref()) {
        state.car_model = Some(model);
    }
    if snapshot.ballast.is_some() {
        state.ballast = snapshot.ballast;
    }
    if snapshot.restrictor.is_some() {
        state.restrictor = snapshot.restrictor;
    }

    let fuel = round1(snapshot.fuel);
    let completed = snapshot.completed_laps;
    let sector = snapshot.current_sector_index;

    // 1. Session boundary
    let key = (session_type.clone(), track.clone());
    if state.session_key.as_ref() != Some(&key) {
        if state.session_open {
            events.push(Event::new(at, EventKind::SessionEnd));
        }
        events.push(Event::new(
            at,
            EventKind::SessionStart {
                session_type,
                track,
                sector_count: snapshot.sector_count,
                car_model: state.car_model.clone(),
            },
        ));
        state.session_open = true;
        state.reset_session();
    }
    state.session_key = Some(key);

    // 2. Pit transition
    let in_pit = snapshot.in_pit_effective();
    let leaves_pit = match state.in_pit {
        None => !in_pit,
        Some(was_in_pit) => was_in_pit && !in_pit,
    };
    let enters_pit = state.in_pit == Some(false) && in_pit;
    if leaves_pit {
        events.push(Event::new(
            at,
            EventKind::StintStart {
                fuel_start: fuel,
                in_pit_lane: false,
                completed_lap: completed,
                car_model: state.car_model.clone(),
            },
        ));
        state.begin_stint(completed, fuel, sector);
    }
    if enters_pit {
        events.push(Event::new(
            at,
            EventKind::StintEnd {
                fuel_end: fuel,
                in_pit_lane: true,
            },
        ));
    }
    state.in_pit = Some(in_pit);

    // 3. Lap validity
    if let Some(flag) = snapshot.is_valid_lap {
        state.lap_valid = Some(state.lap_valid.unwrap_or(true) && flag);
    }

    // 4. Sector split
    match (state.sector_index, sector) {
        (Some(previous), Some(current)) if previous != current => {
            if matches!((previous, current), (0, 1) | (1, 2)) {
                if let Some(split_ms) = canonical_ms(snapshot.split_ms) {
                    events.push(Event::new(
                        at,
                        EventKind::SectorSplit {
                            lap: completed.map(|n| n.saturating_add(1)),
                            sector_index: previous,
                            split_ms,
                        },
                    ));
                }
            }
            state.sector_index = Some(current);
        }
        (None, Some(current)) => state.sector_index = Some(current),
        _ => {}
    }

    // 5. Lap completion
    if let Some(count) = completed {
        if state.completed_laps.is_some_and(|previous| count > previous) {
            events.push(Event::new(
                at,
                EventKind::LapComplete {
                    lap: Some(count),
                    lap_ms: canonical_ms(snapshot.last_time_ms),
                    is_valid: state.lap_valid,
                    fuel_start: state.lap_start_fuel,
                    fuel_end: fuel,
                },
            ));
            state.lap_valid = None;
            state.lap_start_fuel = fuel;
        }
        state.completed_laps = Some(count);
    }

    // 6. Weather
    if !config.weather_interval.is_zero() {
        let current = WeatherValues {
            air_temp: round1(snapshot.air_temp),
            track_temp: round1(snapshot.track_temp),
            grip: clean_str(snapshot.grip.as_deref()),
            rain_intensity: clean_str(snapshot.rain_intensity.as_deref()),
            cloud_level: round1(snapshot.cloud_level),
            wind_speed: round1(snapshot.wind_speed),
            wind_direction: round1(snapshot.wind_direction),
        };
        let last = &state.last_weather;
        let due = state
            .last_weather_at
            .is_none_or(|t| tick.elapsed.saturating_sub(t) >= config.weather_interval);
        let changed = temperature_changed(last.air_temp, current.air_temp, config.weather_delta)
            || temperature_changed(last.track_temp, current.track_temp, config.weather_delta)
            || last.grip != current.grip
            || last.rain_intensity != current.rain_intensity
            || last.wind_speed != current.wind_speed
            || last.wind_direction != current.wind_direction;

        if changed || due {
            events.push(Event::new(
                at,
                EventKind::Weather(WeatherReport {
                    air_temp: current.air_temp,
                    track_temp: current.track_temp,
                    grip: current.grip.clone(),
                    rain_intensity: current.rain_intensity.clone(),
                    cloud_level: current.cloud_level,
                    wind_speed: current.wind_speed,
                    wind_direction: current.wind_direction,
                    ballast: state.ballast,
                    restrictor: state.restrictor,
                    car_model: state.car_model.clone(),
                }),
            ));
            state.last_weather_at = Some(tick.elapsed);
            state.last_weather = current;
        }
    }

    // 7. Heartbeat
    if !config.heartbeat_interval.is_zero()
        && state
            .last_heartbeat_at
            .is_none_or(|t| tick.elapsed.saturating_sub(t) >= config.heartbeat_interval)
    {
        events.push(Event::new(
            at,
            EventKind::Heartbeat {
                fuel,
                speed_kmh: round1(snapshot.speed_kmh),
                is_valid_lap: snapshot.is_valid_lap,
            },
        ));
        state.last_heartbeat_at = Some(tick.elapsed);
    }

    events
}

/// A value appearing or disappearing counts as a change.
fn temperature_changed(last: Option<f64>, current: Option<f64>, delta: f64) -> bool {
    match (last, current) {
        (None, None) => false,
        (Some(a), Some(b)) => (a - b).abs() >= delta,
        _ => true,
    }
}
