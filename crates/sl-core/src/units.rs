//! Canonicalization of raw telemetry values.
//!
//! The simulation reports "no value" in several ways: zero or negative lap
//! times, a reserved sentinel, absurdly long times, NUL-padded strings. Every
//! helper here maps those to `None` so the rest of the crate only ever sees
//! known values or explicit unknowns.

/// Sentinel the simulation uses for "no time recorded".
pub const NO_TIME_SENTINEL_MS: i64 = 2_147_483_647;

/// Upper bound (exclusive) for a plausible lap or split time: 100 minutes.
pub const MAX_TIME_MS: i64 = 100 * 60 * 1000;

/// Prefix carried by normalized grip and session-type categories.
pub const CATEGORY_PREFIX: &str = "ACC_";

/// Canonicalizes a raw millisecond value.
///
/// The value is rounded to the nearest integer first. Values `<= 0`,
/// `>= MAX_TIME_MS` and the sentinel are unknown.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "lap times are far below 2^52 ms"
)]
pub fn canonical_ms(raw: Option<f64>) -> Option<i64> {
    let rounded = raw.filter(|v| v.is_finite())?.round();
    if rounded <= 0.0 || rounded >= MAX_TIME_MS as f64 {
        return None;
    }
    // In range (0, 6_000_000), so the cast is exact.
    canonical_ms_int(rounded as i64)
}

/// Integer counterpart of [`canonical_ms`], for values read back from a log.
#[must_use]
pub const fn canonical_ms_int(ms: i64) -> Option<i64> {
    if ms <= 0 || ms >= MAX_TIME_MS || ms == NO_TIME_SENTINEL_MS {
        None
    } else {
        Some(ms)
    }
}

/// Rounds to one decimal place, dropping non-finite values.
#[must_use]
pub fn round1(raw: Option<f64>) -> Option<f64> {
    raw.filter(|v| v.is_finite()).map(|v| round_to(v, 1))
}

/// Rounds `value` to `decimals` decimal places.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Cuts a string at the first NUL byte. Empty results are unknown.
#[must_use]
pub fn clean_str(raw: Option<&str>) -> Option<String> {
    let cleaned = raw?.split('\0').next().unwrap_or_default();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Normalizes a category label: trimmed, uppercase, spaces to underscores,
/// always carrying [`CATEGORY_PREFIX`].
///
/// ```
/// use sl_core::units::normalize_category;
///
/// assert_eq!(normalize_category("optimum grip").as_deref(), Some("ACC_OPTIMUM_GRIP"));
/// assert_eq!(normalize_category("ACC_WET").as_deref(), Some("ACC_WET"));
/// assert_eq!(normalize_category("  "), None);
/// ```
#[must_use]
pub fn normalize_category(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let upper = trimmed.to_uppercase().replace(' ', "_");
    if upper.starts_with(CATEGORY_PREFIX) {
        Some(upper)
    } else {
        Some(format!("{CATEGORY_PREFIX}{upper}"))
    }
}

/// Formats milliseconds as `m:ss.mmm`.
///
/// ```
/// use sl_core::units::format_lap_time;
///
/// assert_eq!(format_lap_time(Some(125_340)).as_deref(), Some("2:05.340"));
/// assert_eq!(format_lap_time(None), None);
/// ```
#[must_use]
pub fn format_lap_time(ms: Option<i64>) -> Option<String> {
    let ms = u64::try_from(ms?).ok()?;
    let minutes = ms / 60_000;
    let rest = ms % 60_000;
    Some(format!("{minutes}:{:02}.{:03}", rest / 1000, rest % 1000))
}

/// Milliseconds as seconds, rounded to 3 decimals.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "lap times are far below 2^52 ms")]
pub fn ms_to_seconds(ms: i64) -> f64 {
    round_to(ms as f64 / 1000.0, 3)
}
