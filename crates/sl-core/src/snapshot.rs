//! One instantaneous reading of simulation telemetry.

use serde::{Deserialize, Serialize};

/// A raw telemetry snapshot, exactly as the source reports it.
///
/// Every field is optional: the simulation frequently reports nothing for a
/// field (menus, replays, loading screens) and that is a valid reading, not
/// an error. Times are raw milliseconds before canonicalization; strings may
/// still carry NUL padding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub session_type: Option<String>,
    pub track: Option<String>,
    pub sector_count: Option<i32>,

    /// Time of the last completed lap.
    pub last_time_ms: Option<f64>,
    /// Time of the last completed sector.
    pub split_ms: Option<f64>,

    pub air_temp: Option<f64>,
    pub track_temp: Option<f64>,
    pub grip: Option<String>,
    pub rain_intensity: Option<String>,
    pub cloud_level: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,

    pub is_in_pit: Option<bool>,
    pub is_in_pit_lane: Option<bool>,
    /// Zero-based index of the sector the car is in.
    pub current_sector_index: Option<i32>,
    pub is_valid_lap: Option<bool>,

    pub fuel: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub completed_laps: Option<i32>,

    pub car_model: Option<String>,
    pub ballast: Option<i32>,
    pub restrictor: Option<i32>,
}

impl Snapshot {
    /// Pit box or pit lane. Unknown flags count as "not in pit".
    #[must_use]
    pub fn in_pit_effective(&self) -> bool {
        self.is_in_pit.unwrap_or(false) || self.is_in_pit_lane.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_deserialize_as_unknown() {
        let snap: Snapshot = serde_json::from_str(r#"{"track":"monza","fuel":42.5}"#).unwrap();
        assert_eq!(snap.track.as_deref(), Some("monza"));
        assert_eq!(snap.fuel, Some(42.5));
        assert_eq!(snap.completed_laps, None);
        assert_eq!(snap.is_valid_lap, None);
    }

    #[test]
    fn test_pit_lane_counts_as_pit() {
        let snap = Snapshot {
            is_in_pit_lane: Some(true),
            ..Snapshot::default()
        };
        assert!(snap.in_pit_effective());
        assert!(!Snapshot::default().in_pit_effective());
    }
}
