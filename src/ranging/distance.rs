//! Pulse width to distance conversion.

use serde::{Deserialize, Serialize};

/// Distance units per microsecond of echo round trip.
///
/// One unit is 0.1 µm, so 1750 units/µs is 175 m/s: half the speed of sound,
/// which folds the round-trip halving into the constant.
pub const SPEED_OF_SOUND_HALF: i64 = 1750;

/// Units per millimetre.
const UNITS_PER_MM: f64 = 10_000.0;

/// A measured distance in units of 0.1 µm, or the invalid sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Distance(i64);

impl Distance {
    /// Reserved value for "no valid measurement in this cycle".
    pub const INVALID: Distance = Distance(-1);

    /// Wrap a raw value; negative values collapse to [`Distance::INVALID`].
    pub fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            Self::INVALID
        } else {
            Distance(raw)
        }
    }

    /// Raw value in 0.1 µm units (`-1` for invalid).
    pub fn raw(self) -> i64 {
        self.0
    }

    /// True unless this is the sentinel.
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Distance in millimetres, `None` for the sentinel.
    pub fn millimetres(self) -> Option<f64> {
        self.is_valid().then(|| self.0 as f64 / UNITS_PER_MM)
    }

    /// Inverse of [`Distance::millimetres`], used by the simulated backend.
    pub fn round_trip_us_for_mm(mm: f64) -> u64 {
        if !mm.is_finite() || mm <= 0.0 {
            return 0;
        }
        (mm * UNITS_PER_MM / SPEED_OF_SOUND_HALF as f64).round() as u64
    }
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}

/// Convert an echo interval to a distance.
///
/// Returns the sentinel when `end_us <= start_us` (clock anomaly or edge ordering
/// violation) or when the product does not fit.
pub fn compute(start_us: u64, end_us: u64) -> Distance {
    if end_us <= start_us {
        return Distance::INVALID;
    }
    let Ok(interval) = i64::try_from(end_us - start_us) else {
        return Distance::INVALID;
    };
    interval
        .checked_mul(SPEED_OF_SOUND_HALF)
        .map_or(Distance::INVALID, Distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_interval_scales_by_constant() {
        assert_eq!(compute(0, 1000), Distance(1000 * SPEED_OF_SOUND_HALF));
        assert_eq!(compute(250, 251).raw(), SPEED_OF_SOUND_HALF);
    }

    #[test]
    fn non_positive_interval_is_invalid() {
        assert_eq!(compute(1000, 1000), Distance::INVALID);
        assert_eq!(compute(1000, 999), Distance::INVALID);
    }

    #[test]
    fn overflow_is_trapped() {
        assert_eq!(compute(0, u64::MAX), Distance::INVALID);
        assert_eq!(compute(0, i64::MAX as u64), Distance::INVALID);
    }

    #[test]
    fn one_metre_round_trip() {
        // 1 m out and back at 350 m/s is ~5714 µs
        let us = Distance::round_trip_us_for_mm(1000.0);
        assert_eq!(us, 5714);
        let mm = compute(0, us).millimetres().unwrap();
        assert!((mm - 1000.0).abs() < 0.1, "got {mm}");
    }

    #[test]
    fn sentinel_has_no_millimetres() {
        assert_eq!(Distance::INVALID.millimetres(), None);
        assert_eq!(Distance::from_raw(-42), Distance::INVALID);
        assert_eq!(Distance::INVALID.to_string(), "invalid");
    }
}
