//! Per-file summary document.
//!
//! [`summarize`] turns a reconstructed session tree into the JSON document
//! written next to each event log. It never fails: anything the tree does
//! not know comes out as `null` or an empty list.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::format_ts;
use crate::reconstruct::{Session, Stint, StintClass};
use crate::units::{format_lap_time, ms_to_seconds, normalize_category, round_to, round1};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDocument {
    /// File name of the event log, without directories.
    pub file: String,
    /// Stamped by the writer; `None` straight out of [`summarize`].
    pub generated_at: Option<String>,
    pub session: Vec<SessionBlock>,
    /// Every stint of the file, numbered across sessions.
    pub stints: Vec<StintBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBlock {
    #[serde(rename = "type")]
    pub session_type: Option<String>,
    pub track: Option<String>,
    pub car_model: Option<String>,
    pub time: SessionTime,
    pub grip: Option<GripBlock>,
    pub weather: Option<WeatherBlock>,
    pub bop: Option<BopBlock>,
    pub laps: LapCounts,
    pub bests: Bests,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTime {
    pub start_local: Option<String>,
    pub end_local: Option<String>,
    pub duration_min: Option<f64>,
    pub driving_duration_min: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GripBlock {
    pub most_frequent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherBlock {
    pub air_temp_c: AirTemp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirTemp {
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BopBlock {
    pub ballast: Option<i32>,
    pub restrictor: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapCounts {
    /// Laps with a known time.
    pub total_closed: usize,
    pub valid: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bests {
    pub race: Option<Best>,
    pub qualy: Option<Best>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Best {
    pub lap_time_ms: i64,
    pub lap_time_s: f64,
    pub lap_time_hms: Option<String>,
    pub fuel_pitout_l: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StintBlock {
    /// 1-based, across the whole file.
    pub index: usize,
    /// `RACE` or `QUALY`.
    pub stint_type: String,
    pub car_model: Option<String>,
    pub time_start_local: Option<String>,
    pub time_end_local: Option<String>,
    pub driving_duration_min: Option<f64>,
    pub weather_start: WeatherStart,
    pub fuel_pitout: Option<f64>,
    pub laps_total: usize,
    pub laps_valid: usize,
    pub laps_invalid: usize,
    /// Average of the known lap times, formatted.
    pub avg: Option<String>,
    /// Best valid lap in seconds.
    pub lap_time_s: Option<f64>,
    pub best_lap_time: Option<String>,
    pub laps: Vec<LapEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherStart {
    pub air: Option<f64>,
    pub grip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapEntry {
    pub lap: Option<i32>,
    pub lap_ms: Option<i64>,
    pub lap_time: Option<String>,
    pub is_valid: Option<bool>,
    pub fuel_used: Option<f64>,
    pub sectors_ms: Vec<i64>,
}

impl SummaryDocument {
    /// The document written when a file pair is created.
    pub fn empty(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            generated_at: None,
            session: Vec::new(),
            stints: Vec::new(),
        }
    }

    pub fn has_sessions(&self) -> bool {
        !self.session.is_empty()
    }
}

/// Builds the summary document for one event log.
pub fn summarize(file: &str, sessions: &[Session]) -> SummaryDocument {
    let stints = sessions
        .iter()
        .flat_map(|session| session.stints.iter().map(move |stint| (session, stint)))
        .enumerate()
        .map(|(i, (session, stint))| stint_block(i + 1, session, stint))
        .collect();

    SummaryDocument {
        file: file.to_string(),
        generated_at: None,
        session: sessions.iter().map(session_block).collect(),
        stints,
    }
}

fn session_block(session: &Session) -> SessionBlock {
    let laps = || session.stints.iter().flat_map(|s| s.laps.iter());

    let driving = session
        .stints
        .iter()
        .filter_map(Stint::span)
        .fold(Duration::zero(), |acc, span| acc + span);

    let bop = (session.ballast.is_some() || session.restrictor.is_some()).then_some(BopBlock {
        ballast: session.ballast,
        restrictor: session.restrictor,
    });

    SessionBlock {
        session_type: session.session_type.as_deref().and_then(normalize_category),
        track: session.track.clone(),
        car_model: session.car_model.clone(),
        time: SessionTime {
            start_local: session.start.map(format_ts),
            end_local: session.end.map(format_ts),
            duration_min: duration_between(session.start, session.end).map(minutes),
            driving_duration_min: minutes(driving),
        },
        grip: most_frequent(&session.weather_grip).map(|most_frequent| GripBlock { most_frequent }),
        weather: mean(&session.weather_air).and_then(|avg| round1(Some(avg))).map(|avg| {
            WeatherBlock {
                air_temp_c: AirTemp { avg },
            }
        }),
        bop,
        laps: LapCounts {
            total_closed: laps().filter(|l| l.lap_ms.is_some()).count(),
            valid: laps().filter(|l| l.is_valid == Some(true)).count(),
            invalid: laps().filter(|l| l.is_valid == Some(false)).count(),
        },
        bests: Bests {
            race: best_of_class(session, StintClass::Race),
            qualy: best_of_class(session, StintClass::Qualy),
        },
    }
}

/// Fastest stint best of one class. Ties keep the earlier stint.
fn best_of_class(session: &Session, class: StintClass) -> Option<Best> {
    let mut best: Option<(i64, &Stint)> = None;
    for stint in session.stints.iter().filter(|s| s.class == class) {
        if let Some(ms) = stint.best_lap_ms() {
            if best.is_none_or(|(current, _)| ms < current) {
                best = Some((ms, stint));
            }
        }
    }
    best.map(|(ms, stint)| Best {
        lap_time_ms: ms,
        lap_time_s: ms_to_seconds(ms),
        lap_time_hms: format_lap_time(Some(ms)),
        fuel_pitout_l: stint.fuel_start,
    })
}

fn stint_block(index: usize, session: &Session, stint: &Stint) -> StintBlock {
    let best = stint.best_lap_ms();

    StintBlock {
        index,
        stint_type: stint.class.as_str().to_uppercase(),
        car_model: stint.car_model.clone().or_else(|| session.car_model.clone()),
        time_start_local: stint.start.map(format_ts),
        time_end_local: stint.end.map(format_ts),
        driving_duration_min: stint.span().map(minutes),
        weather_start: WeatherStart {
            air: stint.weather_air_start,
            grip: stint.weather_grip_start.as_deref().and_then(normalize_category),
        },
        fuel_pitout: stint.fuel_start,
        laps_total: stint.laps.len(),
        laps_valid: stint.valid_laps(),
        laps_invalid: stint.invalid_laps(),
        avg: format_lap_time(average_lap_ms(stint)),
        lap_time_s: best.map(ms_to_seconds),
        best_lap_time: format_lap_time(best),
        laps: stint
            .laps
            .iter()
            .map(|lap| LapEntry {
                lap: lap.lap,
                lap_ms: lap.lap_ms,
                lap_time: format_lap_time(lap.lap_ms),
                is_valid: lap.is_valid,
                fuel_used: match (lap.fuel_start, lap.fuel_end) {
                    (Some(start), Some(end)) => round1(Some(start - end)),
                    _ => None,
                },
                sectors_ms: lap.sectors_ms.clone(),
            })
            .collect(),
    }
}

/// Mean of the known lap times, rounded to the nearest millisecond.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "lap times are far below 2^52 ms"
)]
fn average_lap_ms(stint: &Stint) -> Option<i64> {
    let times: Vec<f64> = stint
        .laps
        .iter()
        .filter_map(|l| l.lap_ms)
        .map(|ms| ms as f64)
        .collect();
    mean(&times).map(|avg| avg.round() as i64)
}

#[expect(clippy::cast_precision_loss, reason = "lap counts are small")]
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Most frequent value; ties go to the one seen first.
fn most_frequent(values: &[String]) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value.as_str()) {
            Some((_, n)) => *n += 1,
            None => counts.push((value.as_str(), 1)),
        }
    }
    let mut winner: Option<(&str, usize)> = None;
    for (value, n) in counts {
        if winner.is_none_or(|(_, best)| n > best) {
            winner = Some((value, n));
        }
    }
    winner.map(|(value, _)| value.to_string())
}

fn duration_between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<Duration> {
    Some(end? - start?)
}

#[expect(clippy::cast_precision_loss, reason = "session spans are far below 2^52 ms")]
fn minutes(duration: Duration) -> f64 {
    round_to(duration.num_milliseconds() as f64 / 60_000.0, 3)
}
